//! An in-memory catalog that answers statements with the same outcomes and
//! SQLSTATEs a PostgreSQL server would, including the rule that a
//! non-superuser may only hand objects to roles it is a member of, and the
//! folding of unquoted identifiers to lower case. Catalog lookups bind names
//! and compare them exactly.

use crate::connection::{ConnectError, ConnectTarget, Connector};
use crate::session::{CatalogLookup, DdlError, Session, Statement};
use async_trait::async_trait;
use parking_lot::Mutex;
use pgcfn_error::ErrorCodes;
use pgcfn_types::Identifier;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleState {
    pub login: bool,
    pub password: Option<String>,
    pub superuser: bool,
}

#[derive(Default)]
struct CatalogState {
    roles: BTreeMap<String, RoleState>,
    /// database name -> owner
    databases: BTreeMap<String, String>,
    /// schema name -> owner
    schemas: BTreeMap<String, String>,
    extensions: BTreeSet<String>,
    available_extensions: HashSet<String>,
    /// (role, member)
    memberships: BTreeSet<(String, String)>,
    /// Roles reported as absent by the next existence check only.
    hidden_once: HashSet<String>,
    /// Statements starting with the prefix fail with the SQLSTATE.
    failures: Vec<(String, String)>,
    executed: Vec<String>,
    open_sessions: usize,
}

#[derive(Clone, Default)]
pub struct TestCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl TestCatalog {
    pub fn with_superuser(name: &str, password: &str) -> Self {
        let catalog = Self::default();
        {
            let mut state = catalog.state.lock();
            state.roles.insert(
                name.to_string(),
                RoleState {
                    login: true,
                    password: Some(password.to_string()),
                    superuser: true,
                },
            );
            state.databases.insert("postgres".to_string(), name.to_string());
            state.schemas.insert("public".to_string(), name.to_string());
            for extension in ["pgcrypto", "hstore", "postgis", "citext"] {
                state.available_extensions.insert(extension.to_string());
            }
        }
        catalog
    }

    pub fn add_role(&self, name: &str, password: Option<&str>, superuser: bool) {
        self.state.lock().roles.insert(
            name.to_string(),
            RoleState {
                login: password.is_some(),
                password: password.map(str::to_string),
                superuser,
            },
        );
    }

    pub fn add_database(&self, name: &str, owner: &str) {
        self.state
            .lock()
            .databases
            .insert(name.to_string(), owner.to_string());
    }

    pub fn add_schema(&self, name: &str, owner: &str) {
        self.state
            .lock()
            .schemas
            .insert(name.to_string(), owner.to_string());
    }

    pub fn add_extension(&self, name: &str) {
        self.state.lock().extensions.insert(name.to_string());
    }

    pub fn add_membership(&self, role: &str, member: &str) {
        self.state
            .lock()
            .memberships
            .insert((role.to_string(), member.to_string()));
    }

    pub fn hide_role_once(&self, name: &str) {
        self.state.lock().hidden_once.insert(name.to_string());
    }

    pub fn fail_statements(&self, prefix: &str, sqlstate: &str) {
        self.state
            .lock()
            .failures
            .push((prefix.to_string(), sqlstate.to_string()));
    }

    pub fn role(&self, name: &str) -> Option<RoleState> {
        self.state.lock().roles.get(name).cloned()
    }

    pub fn database_owner(&self, name: &str) -> Option<String> {
        self.state.lock().databases.get(name).cloned()
    }

    pub fn schema_owner(&self, name: &str) -> Option<String> {
        self.state.lock().schemas.get(name).cloned()
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.state.lock().extensions.contains(name)
    }

    pub fn is_member(&self, role: &str, member: &str) -> bool {
        self.state
            .lock()
            .memberships
            .contains(&(role.to_string(), member.to_string()))
    }

    /// Redacted text of every statement that reached the catalog.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    /// Everything except the audit trail, for before/after comparisons.
    pub fn snapshot(&self) -> String {
        let state = self.state.lock();
        format!(
            "{:?}|{:?}|{:?}|{:?}|{:?}",
            state.roles, state.databases, state.schemas, state.extensions, state.memberships
        )
    }
}

/// The name the server records for `ident` in `sql`: verbatim when the
/// statement quotes it, folded to lower case otherwise.
fn stored_name(sql: &str, ident: &Identifier) -> String {
    if sql.contains(&ident.quoted()) {
        ident.to_string()
    } else {
        ident.as_str().to_lowercase()
    }
}

fn err(statement: &Statement, sqlstate: &str, message: String) -> DdlError {
    DdlError::new(statement, Some(sqlstate.to_string()), message)
}

impl CatalogState {
    fn can_act_as(&self, user: &str, role: &str) -> bool {
        user == role
            || self.roles.get(user).is_some_and(|r| r.superuser)
            || self
                .memberships
                .contains(&(role.to_string(), user.to_string()))
    }

    fn require_role(&self, statement: &Statement, name: &str) -> Result<(), DdlError> {
        if self.roles.contains_key(name) {
            Ok(())
        } else {
            Err(err(statement, "42704", format!("role \"{name}\" does not exist")))
        }
    }

    fn require_can_act_as(&self, statement: &Statement, user: &str, role: &str) -> Result<(), DdlError> {
        self.require_role(statement, role)?;
        if self.can_act_as(user, role) {
            Ok(())
        } else {
            Err(err(
                statement,
                "42501",
                format!("must be able to SET ROLE \"{role}\""),
            ))
        }
    }

    fn apply(&mut self, user: &str, statement: &Statement) -> Result<(), DdlError> {
        let sql = statement.sql();
        if let Some((_, sqlstate)) = self
            .failures
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            return Err(err(statement, sqlstate, "injected failure".to_string()));
        }
        let name = |ident: &Identifier| stored_name(&sql, ident);
        match statement {
            Statement::CreateRole { name: role, password } => {
                let role = name(role);
                if self.roles.contains_key(&role) {
                    return Err(err(statement, "42710", format!("role \"{role}\" already exists")));
                }
                self.roles.insert(
                    role,
                    RoleState {
                        login: true,
                        password: Some(password.expose().to_string()),
                        superuser: false,
                    },
                );
            }
            Statement::AlterRolePassword { name: role, password } => {
                let role = name(role);
                self.require_role(statement, &role)?;
                if let Some(state) = self.roles.get_mut(&role) {
                    state.login = true;
                    state.password = Some(password.expose().to_string());
                }
            }
            Statement::AlterRoleNoLogin { name: role } => {
                let role = name(role);
                self.require_role(statement, &role)?;
                if let Some(state) = self.roles.get_mut(&role) {
                    state.login = false;
                }
            }
            Statement::DropRole { name: role } => {
                let role = name(role);
                if !self.roles.contains_key(&role) {
                    return Ok(());
                }
                let owns_objects = self.databases.values().any(|owner| *owner == role)
                    || self.schemas.values().any(|owner| *owner == role);
                if owns_objects {
                    return Err(err(
                        statement,
                        "2BP01",
                        format!("role \"{role}\" cannot be dropped because some objects depend on it"),
                    ));
                }
                self.roles.remove(&role);
                self.memberships
                    .retain(|(granted, member)| *granted != role && *member != role);
            }
            Statement::CreateDatabase { name: database, owner } => {
                let (database, owner) = (name(database), name(owner));
                if self.databases.contains_key(&database) {
                    return Err(err(statement, "42P04", format!("database \"{database}\" already exists")));
                }
                self.require_can_act_as(statement, user, &owner)?;
                self.databases.insert(database, owner);
            }
            Statement::AlterDatabaseOwner { name: database, owner } => {
                let (database, owner) = (name(database), name(owner));
                if !self.databases.contains_key(&database) {
                    return Err(err(statement, "3D000", format!("database \"{database}\" does not exist")));
                }
                self.require_can_act_as(statement, user, &owner)?;
                self.databases.insert(database, owner);
            }
            Statement::DropDatabase { name: database } => {
                self.databases.remove(&name(database));
            }
            Statement::GrantRole { role, grantee } => {
                let (role, grantee) = (name(role), name(grantee));
                self.require_role(statement, &role)?;
                self.require_role(statement, &grantee)?;
                self.memberships.insert((role, grantee));
            }
            Statement::RevokeRole { role, grantee } => {
                let (role, grantee) = (name(role), name(grantee));
                self.require_role(statement, &role)?;
                self.require_role(statement, &grantee)?;
                self.memberships.remove(&(role, grantee));
            }
            Statement::CreateSchema { name: schema, owner } => {
                let (schema, owner) = (name(schema), name(owner));
                if self.schemas.contains_key(&schema) {
                    return Err(err(statement, "42P06", format!("schema \"{schema}\" already exists")));
                }
                self.require_can_act_as(statement, user, &owner)?;
                self.schemas.insert(schema, owner);
            }
            Statement::AlterSchemaOwner { name: schema, owner } => {
                let (schema, owner) = (name(schema), name(owner));
                if !self.schemas.contains_key(&schema) {
                    return Err(err(statement, "3F000", format!("schema \"{schema}\" does not exist")));
                }
                self.require_can_act_as(statement, user, &owner)?;
                self.schemas.insert(schema, owner);
            }
            Statement::RenameSchema { from, to } => {
                let (from, to) = (name(from), name(to));
                if self.schemas.contains_key(&to) {
                    return Err(err(statement, "42P06", format!("schema \"{to}\" already exists")));
                }
                let Some(owner) = self.schemas.remove(&from) else {
                    return Err(err(statement, "3F000", format!("schema \"{from}\" does not exist")));
                };
                self.schemas.insert(to, owner);
            }
            Statement::DropSchema { name: schema } => {
                self.schemas.remove(&name(schema));
            }
            Statement::CreateExtension { name: extension } => {
                let extension = name(extension);
                if !self.available_extensions.contains(&extension) {
                    return Err(err(
                        statement,
                        "0A000",
                        format!("extension \"{extension}\" is not available"),
                    ));
                }
                self.extensions.insert(extension);
            }
            Statement::DropExtension { name: extension } => {
                self.extensions.remove(&name(extension));
            }
        }
        Ok(())
    }

    fn lookup(&mut self, lookup: &CatalogLookup) -> bool {
        match lookup {
            CatalogLookup::Role(name) => {
                !self.hidden_once.remove(name.as_str()) && self.roles.contains_key(name.as_str())
            }
            CatalogLookup::Database(name) => self.databases.contains_key(name.as_str()),
            CatalogLookup::Schema(name) => self.schemas.contains_key(name.as_str()),
            CatalogLookup::Membership { role, member } => self
                .memberships
                .contains(&(role.to_string(), member.to_string())),
        }
    }
}

pub struct TestSession {
    catalog: TestCatalog,
    user: String,
    closed: bool,
}

#[async_trait]
impl Session for TestSession {
    async fn execute(&mut self, statement: &Statement) -> Result<(), DdlError> {
        if self.closed {
            return Err(DdlError::new(statement, Some("08003".to_string()), "session is closed"));
        }
        let mut state = self.catalog.state.lock();
        state.executed.push(statement.to_string());
        state.apply(&self.user, statement)
    }

    async fn exists(&mut self, lookup: &CatalogLookup) -> Result<bool, DdlError> {
        if self.closed {
            return Err(DdlError::new(lookup, Some("08003".to_string()), "session is closed"));
        }
        Ok(self.catalog.state.lock().lookup(lookup))
    }

    async fn close(&mut self) -> Result<(), DdlError> {
        if !self.closed {
            self.closed = true;
            self.catalog.state.lock().open_sessions -= 1;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct TestConnector {
    catalog: TestCatalog,
}

impl TestConnector {
    pub fn new(catalog: TestCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, ConnectError> {
        let mut state = self.catalog.state.lock();
        let authenticated = state.roles.get(target.user.as_str()).is_some_and(|role| {
            role.login && role.password.as_deref() == Some(target.password.expose())
        });
        if !authenticated {
            return Err(ConnectError::Refused {
                target: target.to_string(),
                message: format!("password authentication failed for user \"{}\"", target.user),
                code: ErrorCodes::Unauthenticated,
            });
        }
        if !state.databases.contains_key(target.dbname.as_str()) {
            return Err(ConnectError::Refused {
                target: target.to_string(),
                message: format!("database \"{}\" does not exist", target.dbname),
                code: ErrorCodes::Unavailable,
            });
        }
        state.open_sessions += 1;
        Ok(Box::new(TestSession {
            catalog: self.catalog.clone(),
            user: target.user.to_string(),
            closed: false,
        }))
    }
}
