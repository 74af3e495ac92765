//! Command builder: turns a query, its kind, a timeout and parameters into a
//! bound [`Statement`]

use std::time::Duration;

use tracing::debug;

use crate::binder::{DbParams, ParamSet};
use crate::config::defaults;
use crate::connection::DbConnection;
use crate::enumerator::AsyncEnumerator;
use crate::error::{Error, Result};
use crate::traits::{Connection, ExecuteResult, FromRow, ToParams};
use crate::transaction::TransactionId;
use crate::value::Value;

/// How the query text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Plain SQL, with `:name` parameter placeholders
    Text,
    /// The name of a stored procedure; parameters are its arguments
    #[default]
    StoredProcedure,
}

/// A bound, executable query or stored procedure call.
///
/// Built once per logical call and consumed when executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    query: String,
    kind: CommandKind,
    timeout: Duration,
    params: ParamSet,
    transaction: Option<TransactionId>,
}

impl Statement {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }
}

/// Builder state before a connection is attached.
pub struct Unsealed;

/// Builder state once a connection is attached; it cannot be replaced.
pub struct Sealed<'c, C: Connection> {
    conn: &'c mut DbConnection<C>,
}

/// Fluent command builder.
///
/// Parameters come either from an explicit [`DbParams`] list or from a
/// parameter object whose fields are all bound by name; when both are given
/// the explicit list wins. Binding happens in `build()`, so an invalid
/// parameter fails there and never at execution.
///
/// # Example
///
/// ```ignore
/// let user: Option<User> = Command::new("get_user")
///     .params(DbParams::new().add("id", 42))
///     .connection(&mut conn)
///     .build()?
///     .first()
///     .await?;
/// ```
pub struct Command<S = Unsealed> {
    query: String,
    kind: CommandKind,
    timeout: Duration,
    params: Option<DbParams>,
    object: Option<(&'static [&'static str], Vec<Value>)>,
    transaction: Option<TransactionId>,
    state: S,
}

impl<S> Command<S> {
    /// Set the query text or procedure name.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Shorthand for `kind(CommandKind::Text)`.
    pub fn text(self) -> Self {
        self.kind(CommandKind::Text)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use an explicit parameter list.
    pub fn params(mut self, params: DbParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Bind every field of `object` as a parameter of the same name.
    pub fn object<P: ToParams + ?Sized>(mut self, object: &P) -> Self {
        self.object = Some((P::param_names(), object.param_values()));
        self
    }

    /// Run under a specific transaction.
    pub fn transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    fn bind(&mut self, transaction: Option<TransactionId>) -> Result<Statement> {
        if self.query.trim().is_empty() {
            return Err(Error::Query("command text is empty".to_string()));
        }

        let params = match (self.params.take(), self.object.take()) {
            (Some(params), _) => ParamSet::from_params(&params)?,
            (None, Some((names, values))) => ParamSet::from_named_values(names, values)?,
            (None, None) => ParamSet::new(),
        };
        if self.kind == CommandKind::Text {
            if let Some(output) = params.outputs().next() {
                return Err(Error::Binding(format!(
                    "output parameter `{}` requires a stored procedure",
                    output.name()
                )));
            }
        }

        Ok(Statement {
            query: std::mem::take(&mut self.query),
            kind: self.kind,
            timeout: self.timeout,
            params,
            transaction: self.transaction.or(transaction),
        })
    }

    fn with_state<N>(self, state: N) -> Command<N> {
        Command {
            query: self.query,
            kind: self.kind,
            timeout: self.timeout,
            params: self.params,
            object: self.object,
            transaction: self.transaction,
            state,
        }
    }
}

impl Command<Unsealed> {
    /// Start a command. Defaults: stored procedure, 30 second timeout.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kind: CommandKind::default(),
            timeout: Duration::from_secs(defaults::COMMAND_TIMEOUT_SECS),
            params: None,
            object: None,
            transaction: None,
            state: Unsealed,
        }
    }

    /// Attach the connection the command will run on.
    pub fn connection<C: Connection>(self, conn: &mut DbConnection<C>) -> Command<Sealed<'_, C>> {
        self.with_state(Sealed { conn })
    }

    /// Bind parameters into a detached statement, to be run with
    /// [`DbConnection::execute`] and friends.
    pub fn build(mut self) -> Result<Statement> {
        self.bind(None)
    }
}

impl<'c, C: Connection> Command<Sealed<'c, C>> {
    /// The connection is already set; a second one is ignored.
    pub fn connection(self, _conn: &mut DbConnection<C>) -> Self {
        debug!("command connection already set; ignoring replacement");
        self
    }

    /// Bind parameters. Without an explicit transaction, the one active on
    /// the connection (if any) is attached.
    pub fn build(mut self) -> Result<BoundCommand<'c, C>> {
        let active = self.state.conn.active_transaction();
        let statement = self.bind(active)?;
        Ok(BoundCommand {
            conn: self.state.conn,
            statement,
        })
    }
}

/// A statement bound to the connection it will run on.
pub struct BoundCommand<'c, C: Connection> {
    conn: &'c mut DbConnection<C>,
    statement: Statement,
}

impl<'c, C: Connection> BoundCommand<'c, C> {
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub async fn execute(self) -> Result<ExecuteResult> {
        let BoundCommand { conn, statement } = self;
        conn.execute(statement).await
    }

    /// Materialize the first row, if any.
    pub async fn first<T: FromRow>(self) -> Result<Option<T>> {
        let BoundCommand { conn, statement } = self;
        conn.first(statement).await
    }

    pub async fn fetch_all<T: FromRow>(self) -> Result<Vec<T>> {
        let BoundCommand { conn, statement } = self;
        conn.fetch_all(statement).await
    }

    /// Stream the rows of the first result.
    pub async fn stream<T: FromRow>(self) -> Result<AsyncEnumerator<'c, T>> {
        let BoundCommand { conn, statement } = self;
        conn.query(statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::DbType;

    struct Lookup {
        id: i32,
        name: String,
    }

    impl ToParams for Lookup {
        fn param_names() -> &'static [&'static str] {
            &["id", "name"]
        }

        fn param_values(&self) -> Vec<Value> {
            vec![Value::I32(self.id), Value::String(self.name.clone())]
        }
    }

    #[test]
    fn test_defaults() {
        let statement = Command::new("get_user").build().unwrap();
        assert_eq!(statement.kind(), CommandKind::StoredProcedure);
        assert_eq!(statement.timeout(), Duration::from_secs(30));
        assert!(statement.params().is_empty());
        assert_eq!(statement.transaction(), None);
    }

    #[test]
    fn test_object_parameters_are_bound_by_name() {
        let statement = Command::new("get_user")
            .object(&Lookup {
                id: 42,
                name: "ada".into(),
            })
            .build()
            .unwrap();
        assert_eq!(statement.params().get("id").unwrap().db_type(), DbType::Int);
        assert_eq!(
            statement.params().get("name").unwrap().value(),
            &Value::String("ada".into())
        );
    }

    #[test]
    fn test_explicit_params_take_precedence() {
        let statement = Command::new("get_user")
            .object(&Lookup {
                id: 1,
                name: "x".into(),
            })
            .params(DbParams::new().add("id", 7i64))
            .build()
            .unwrap();
        assert_eq!(statement.params().len(), 1);
        assert_eq!(statement.params().get("id").unwrap().value(), &Value::I64(7));
    }

    #[test]
    fn test_binding_fails_at_build() {
        let result = Command::new("select :v")
            .text()
            .params(DbParams::new().add("v", Value::Null))
            .build();
        assert!(matches!(result, Err(Error::Binding(_))));

        assert!(Command::new("  ").build().is_err());
    }

    #[test]
    fn test_output_parameter_needs_stored_procedure() {
        let params = || DbParams::new().add_output("total", DbType::Int, None);
        let text = Command::new("SELECT 1").text().params(params()).build();
        assert!(matches!(text, Err(Error::Binding(msg)) if msg.contains("total")));

        let procedure = Command::new("count_orders").params(params()).build().unwrap();
        assert_eq!(procedure.params().outputs().count(), 1);
    }
}
