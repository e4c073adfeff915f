use crate::config::{ConnectionConfig, SslMode};
use crate::connection::{ConnectError, ConnectTarget, Connector};
use crate::session::{CatalogLookup, DdlError, Session, Statement};
use async_trait::async_trait;
use pgcfn_error::{ErrorCodes, ProviderError, WrappedSqlxError};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// Opens a single unpooled connection per invocation.
#[derive(Clone, Debug)]
pub struct PgConnector {
    config: ConnectionConfig,
}

impl PgConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self, target: &ConnectTarget) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(target.dbname.as_str())
            .username(target.user.as_str())
            .password(target.password.expose())
            .ssl_mode(self.config.ssl_mode.into())
            .application_name(&self.config.application_name)
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, ConnectError> {
        let options = self.connect_options(target);
        let connect = PgConnection::connect_with(&options);
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(connection)) => Ok(Box::new(PgSession::new(connection))),
            Ok(Err(err)) => {
                let err = WrappedSqlxError(err);
                // The server reports bad credentials as a database error.
                let code = match err.code() {
                    ErrorCodes::Unauthenticated => ErrorCodes::Unauthenticated,
                    _ => ErrorCodes::Unavailable,
                };
                Err(ConnectError::Refused {
                    target: target.to_string(),
                    message: err.0.to_string(),
                    code,
                })
            }
            Err(_) => Err(ConnectError::Timeout {
                target: target.to_string(),
                seconds: self.config.connect_timeout.as_secs(),
            }),
        }
    }
}

/// An autocommit session on a dedicated connection.
pub struct PgSession {
    connection: Option<PgConnection>,
}

impl PgSession {
    pub fn new(connection: PgConnection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn connection(&mut self, what: &dyn std::fmt::Display) -> Result<&mut PgConnection, DdlError> {
        self.connection
            .as_mut()
            .ok_or_else(|| DdlError::new(what, None, "session is closed"))
    }
}

fn ddl_error(what: &dyn std::fmt::Display, err: sqlx::Error) -> DdlError {
    let err = WrappedSqlxError(err);
    let sqlstate = err.sqlstate();
    let message = match &err.0 {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    };
    DdlError::new(what, sqlstate, message)
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, statement: &Statement) -> Result<(), DdlError> {
        let sql = statement.sql();
        let connection = self.connection(statement)?;
        sqlx::Executor::execute(connection, sqlx::raw_sql(&sql))
            .await
            .map(|_| ())
            .map_err(|e| ddl_error(statement, e))
    }

    async fn exists(&mut self, lookup: &CatalogLookup) -> Result<bool, DdlError> {
        let connection = self.connection(lookup)?;
        let mut query = sqlx::query_scalar::<_, bool>(lookup.query());
        for bind in lookup.binds() {
            query = query.bind(bind);
        }
        query
            .fetch_one(connection)
            .await
            .map_err(|e| ddl_error(lookup, e))
    }

    async fn close(&mut self) -> Result<(), DdlError> {
        match self.connection.take() {
            Some(connection) => connection
                .close()
                .await
                .map_err(|e| ddl_error(&"close", e)),
            None => Ok(()),
        }
    }
}
