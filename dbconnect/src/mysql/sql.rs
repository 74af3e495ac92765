//! SQL generation for the MySQL adapter

use mysql_async::Value as MySqlValue;

use crate::binder::{BoundParam, DbType, Size};
use crate::bulk::BulkBatch;
use crate::command::Statement;
use crate::error::{Error, Result};

use super::types::{output_cast, to_mysql_value};

/// Placeholder limit of one prepared statement.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Quote an identifier, which may be qualified (`db.table`).
pub(crate) fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.trim_matches('`').replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Replace `:name` placeholders with `?`, returning the names in order.
///
/// Quoted strings, quoted identifiers, comments, `::` and `:=` are left
/// untouched.
pub(crate) fn rewrite_named(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                while let Some(q) = chars.next() {
                    out.push(q);
                    if q == '\\' && c != '`' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if q == c {
                        if chars.peek() == Some(&c) {
                            out.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '#' => {
                out.push(c);
                copy_line(&mut chars, &mut out);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                copy_line(&mut chars, &mut out);
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(c);
                let mut prev = '\0';
                for b in chars.by_ref() {
                    out.push(b);
                    if prev == '*' && b == '/' {
                        break;
                    }
                    prev = b;
                }
            }
            ':' => match chars.peek() {
                Some(&n) if n.is_alphabetic() || n == '_' => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n.is_alphanumeric() || n == '_' {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push('?');
                    names.push(name);
                }
                Some(&n) if n == ':' || n == '=' => {
                    out.push(c);
                    out.push(n);
                    chars.next();
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }
    (out, names)
}

fn copy_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    for c in chars.by_ref() {
        out.push(c);
        if c == '\n' {
            break;
        }
    }
}

/// A text statement with its placeholders resolved to positional arguments.
pub(crate) fn bind_text(statement: &Statement) -> Result<(String, Vec<MySqlValue>)> {
    let (sql, names) = rewrite_named(statement.query());
    let args = names
        .iter()
        .map(|name| {
            statement
                .params()
                .get(name)
                .map(|p| to_mysql_value(p.value()))
                .ok_or_else(|| Error::Binding(format!("parameter `{}` is not bound", name)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((sql, args))
}

/// Mode of a declared procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamMode {
    In,
    Out,
    InOut,
}

impl ParamMode {
    fn parse(mode: &str) -> Result<Self> {
        match mode.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(ParamMode::In),
            "OUT" => Ok(ParamMode::Out),
            "INOUT" => Ok(ParamMode::InOut),
            other => Err(Error::Query(format!("unknown parameter mode `{}`", other))),
        }
    }
}

/// Declared parameters of an existing stored procedure, one row per
/// parameter in ordinal order. A procedure without parameters yields a
/// single row of nulls; a missing procedure yields no rows.
pub(crate) const SIGNATURE_QUERY: &str = "SELECT p.PARAMETER_NAME, p.PARAMETER_MODE \
     FROM information_schema.ROUTINES r \
     LEFT JOIN information_schema.PARAMETERS p \
       ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA \
      AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
      AND p.ROUTINE_TYPE = 'PROCEDURE' \
      AND p.ORDINAL_POSITION > 0 \
     WHERE r.ROUTINE_SCHEMA = COALESCE(?, DATABASE()) \
       AND r.ROUTINE_NAME = ? \
       AND r.ROUTINE_TYPE = 'PROCEDURE' \
     ORDER BY p.ORDINAL_POSITION";

/// Split `db.proc` into its schema and name, unquoted.
pub(crate) fn split_procedure(name: &str) -> (Option<String>, String) {
    let unquote = |part: &str| part.trim().trim_matches('`').replace("``", "`");
    match name.trim().rsplit_once('.') {
        Some((schema, proc_name)) => (Some(unquote(schema)), unquote(proc_name)),
        None => (None, unquote(name)),
    }
}

/// The declared parameters of a stored procedure, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProcedureSignature {
    params: Vec<(String, ParamMode)>,
}

impl ProcedureSignature {
    /// Build from the rows of [`SIGNATURE_QUERY`]; `None` when the
    /// procedure does not exist.
    pub fn from_rows(rows: Vec<(Option<String>, Option<String>)>) -> Result<Option<Self>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let params = rows
            .into_iter()
            .filter_map(|(name, mode)| Some((name?, mode?)))
            .map(|(name, mode)| Ok((name, ParamMode::parse(&mode)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Self { params }))
    }

    fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|(p, _)| p.eq_ignore_ascii_case(name))
    }
}

/// A stored procedure call.
///
/// Arguments are placed by name into the declared parameter order. Each
/// output parameter is a session variable that is reset before the call and
/// read back after.
pub(crate) struct ProcedureCall<'s> {
    pub sql: String,
    pub args: Vec<MySqlValue>,
    outputs: Vec<&'s BoundParam>,
}

fn output_variable(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("@dbc_out_{}", name)
}

impl<'s> ProcedureCall<'s> {
    /// Without a signature (the procedure was not found) the arguments keep
    /// their binding order and the server reports the missing procedure.
    pub fn new(statement: &'s Statement, signature: Option<&ProcedureSignature>) -> Result<Self> {
        let procedure = statement.query().trim();
        let params = statement.params();
        let ordered: Vec<&'s BoundParam> = match signature {
            None => params.iter().collect(),
            Some(signature) => {
                if let Some(unknown) = params.iter().find(|p| !signature.declares(p.name())) {
                    return Err(Error::Binding(format!(
                        "procedure `{}` has no parameter `{}`",
                        procedure,
                        unknown.name()
                    )));
                }
                signature
                    .params
                    .iter()
                    .map(|(name, mode)| {
                        let param = params.get(name).ok_or_else(|| {
                            Error::Binding(format!(
                                "parameter `{}` of procedure `{}` is not bound",
                                name, procedure
                            ))
                        })?;
                        match (*mode, param.is_output()) {
                            (ParamMode::In, true) => Err(Error::Binding(format!(
                                "`{}` is an IN parameter of `{}` but is bound as output",
                                name, procedure
                            ))),
                            (ParamMode::Out | ParamMode::InOut, false) => {
                                Err(Error::Binding(format!(
                                    "`{}` is an OUT parameter of `{}`; bind it as output",
                                    name, procedure
                                )))
                            }
                            _ => Ok(param),
                        }
                    })
                    .collect::<Result<_>>()?
            }
        };

        let mut placeholders = Vec::new();
        let mut args = Vec::new();
        let mut outputs = Vec::new();
        for param in ordered {
            if param.is_output() {
                placeholders.push(output_variable(param.name()));
                outputs.push(param);
            } else {
                placeholders.push("?".to_string());
                args.push(to_mysql_value(param.value()));
            }
        }
        Ok(Self {
            sql: format!("CALL {}({})", quote_identifier(procedure), placeholders.join(", ")),
            args,
            outputs,
        })
    }

    pub fn outputs(&self) -> &[&'s BoundParam] {
        &self.outputs
    }

    /// `SET @a = NULL, ...`, so an output the procedure never sets reads NULL.
    pub fn reset_outputs(&self) -> Option<String> {
        if self.outputs.is_empty() {
            return None;
        }
        let assignments: Vec<_> = self
            .outputs
            .iter()
            .map(|p| format!("{} = NULL", output_variable(p.name())))
            .collect();
        Some(format!("SET {}", assignments.join(", ")))
    }

    /// `SELECT CAST(@a AS ...), ...`, typed by each output's declared type.
    pub fn select_outputs(&self) -> Option<String> {
        if self.outputs.is_empty() {
            return None;
        }
        let columns: Vec<_> = self
            .outputs
            .iter()
            .map(|p| {
                format!(
                    "CAST({} AS {})",
                    output_variable(p.name()),
                    output_cast(p.db_type(), p.size().unwrap_or(Size::Unbounded))
                )
            })
            .collect();
        Some(format!("SELECT {}", columns.join(", ")))
    }

    pub fn output_types(&self) -> impl Iterator<Item = (&'s str, DbType)> + '_ {
        self.outputs.iter().map(|p| (p.name(), p.db_type()))
    }
}

/// Multi-row `INSERT` statements for one bulk batch, split so that no
/// statement exceeds the placeholder limit.
pub(crate) fn bulk_inserts(batch: &BulkBatch) -> Vec<(String, Vec<MySqlValue>)> {
    if batch.columns.is_empty() || batch.rows.is_empty() {
        return Vec::new();
    }

    let columns = batch
        .columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let single_placeholder = format!("({})", vec!["?"; batch.columns.len()].join(", "));
    let rows_per_statement = (MAX_PLACEHOLDERS / batch.columns.len()).max(1);

    batch
        .rows
        .chunks(rows_per_statement)
        .map(|chunk| {
            let all_placeholders = vec![single_placeholder.as_str(); chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_identifier(&batch.table),
                columns,
                all_placeholders
            );
            let params = chunk.iter().flatten().map(to_mysql_value).collect();
            (sql, params)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::DbParams;
    use crate::command::Command;
    use crate::value::Value;
    use std::time::Duration;

    #[test]
    fn test_rewrite_named_placeholders() {
        let (sql, names) =
            rewrite_named("SELECT * FROM users WHERE id = :id AND (name = :Name OR :id IS NULL)");
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE id = ? AND (name = ? OR ? IS NULL)"
        );
        assert_eq!(names, ["id", "Name", "id"]);
    }

    #[test]
    fn test_rewrite_skips_literals_and_comments() {
        let (sql, names) = rewrite_named(
            "SELECT ':a', \"b:c\", `x:y`, 'it''s :d' -- :e\n, @v := :f /* :g */ # :h",
        );
        assert_eq!(
            sql,
            "SELECT ':a', \"b:c\", `x:y`, 'it''s :d' -- :e\n, @v := ? /* :g */ # :h"
        );
        assert_eq!(names, ["f"]);
    }

    #[test]
    fn test_bind_text() {
        let statement = Command::new("SELECT :id, :missing")
            .text()
            .params(DbParams::new().add("id", 1))
            .build()
            .unwrap();
        assert!(matches!(bind_text(&statement), Err(Error::Binding(_))));

        let statement = Command::new("SELECT :ID")
            .text()
            .params(DbParams::new().add("@id", 1))
            .build()
            .unwrap();
        let (sql, args) = bind_text(&statement).unwrap();
        assert_eq!(sql, "SELECT ?");
        assert_eq!(args, vec![MySqlValue::Int(1)]);
    }

    fn signature(params: &[(&str, &str)]) -> ProcedureSignature {
        let rows = params
            .iter()
            .map(|(name, mode)| (Some(name.to_string()), Some(mode.to_string())))
            .collect();
        ProcedureSignature::from_rows(rows).unwrap().unwrap()
    }

    fn add_user(params: DbParams) -> Statement {
        Command::new("add_user").params(params).build().unwrap()
    }

    fn add_user_signature() -> ProcedureSignature {
        signature(&[("p_name", "IN"), ("p_email", "IN"), ("p_new_id", "OUT")])
    }

    #[test]
    fn test_procedure_call() {
        let statement = Command::new("shop.count_orders")
            .params(
                DbParams::new()
                    .add_output("last name", DbType::NVarChar, Some(40))
                    .add("customer", 7i64)
                    .add_output("total", DbType::Int, None),
            )
            .build()
            .unwrap();
        let signature = signature(&[("customer", "IN"), ("total", "OUT"), ("Last Name", "INOUT")]);
        let call = ProcedureCall::new(&statement, Some(&signature)).unwrap();
        assert_eq!(
            call.sql,
            "CALL `shop`.`count_orders`(?, @dbc_out_total, @dbc_out_last_name)"
        );
        assert_eq!(call.args, vec![MySqlValue::Int(7)]);
        assert_eq!(
            call.reset_outputs().unwrap(),
            "SET @dbc_out_total = NULL, @dbc_out_last_name = NULL"
        );
        assert_eq!(
            call.select_outputs().unwrap(),
            "SELECT CAST(@dbc_out_total AS SIGNED), CAST(@dbc_out_last_name AS CHAR(40))"
        );

        let plain = Command::new("touch").build().unwrap();
        let no_params = ProcedureSignature::from_rows(vec![(None, None)]).unwrap();
        let call = ProcedureCall::new(&plain, no_params.as_ref()).unwrap();
        assert_eq!(call.sql, "CALL `touch`()");
        assert!(call.reset_outputs().is_none());
    }

    #[test]
    fn test_procedure_arguments_follow_declared_order() {
        let declared = add_user(
            DbParams::new()
                .add("p_name", "ada")
                .add("p_email", "a@x")
                .add_output("p_new_id", DbType::BigInt, None),
        );
        let reversed = add_user(
            DbParams::new()
                .add_output("p_new_id", DbType::BigInt, None)
                .add("@P_EMAIL", "a@x")
                .add("p_name", "ada"),
        );
        let signature = add_user_signature();
        let a = ProcedureCall::new(&declared, Some(&signature)).unwrap();
        let b = ProcedureCall::new(&reversed, Some(&signature)).unwrap();
        assert_eq!(a.sql, "CALL `add_user`(?, ?, @dbc_out_p_new_id)");
        assert_eq!(a.sql, b.sql);
        assert_eq!(a.args, b.args);
        assert_eq!(
            b.args,
            vec![MySqlValue::from("ada"), MySqlValue::from("a@x")]
        );
    }

    #[test]
    fn test_procedure_binding_errors() {
        let signature = add_user_signature();
        let cases = [
            // unknown name
            DbParams::new()
                .add("p_name", "ada")
                .add("p_mail", "a@x")
                .add_output("p_new_id", DbType::BigInt, None),
            // declared parameter left unbound
            DbParams::new()
                .add("p_name", "ada")
                .add_output("p_new_id", DbType::BigInt, None),
            // OUT parameter bound as input
            DbParams::new()
                .add("p_name", "ada")
                .add("p_email", "a@x")
                .add("p_new_id", 1i64),
            // IN parameter bound as output
            DbParams::new()
                .add_output("p_name", DbType::NVarChar, Some(10))
                .add("p_email", "a@x")
                .add_output("p_new_id", DbType::BigInt, None),
        ];
        for params in cases {
            let statement = add_user(params);
            assert!(matches!(
                ProcedureCall::new(&statement, Some(&signature)),
                Err(Error::Binding(_))
            ));
        }
    }

    #[test]
    fn test_missing_procedure_keeps_binding_order() {
        assert_eq!(ProcedureSignature::from_rows(Vec::new()).unwrap(), None);
        let statement = add_user(DbParams::new().add("b", 2).add("a", 1));
        let call = ProcedureCall::new(&statement, None).unwrap();
        assert_eq!(call.sql, "CALL `add_user`(?, ?)");
        assert_eq!(call.args, vec![MySqlValue::Int(2), MySqlValue::Int(1)]);
    }

    #[test]
    fn test_split_procedure() {
        assert_eq!(split_procedure("get_user"), (None, "get_user".to_string()));
        assert_eq!(
            split_procedure(" `shop`.`get_user` "),
            (Some("shop".to_string()), "get_user".to_string())
        );
    }

    #[test]
    fn test_bulk_inserts_split_at_placeholder_limit() {
        let batch = BulkBatch {
            table: "people".into(),
            columns: vec!["name".into(), "email".into()],
            rows: (0..40_000)
                .map(|i| vec![Value::String(format!("p{i}")), Value::Null])
                .collect(),
            timeout: Duration::from_secs(30),
        };
        let statements = bulk_inserts(&batch);
        assert_eq!(statements.len(), 2);
        assert!(statements[0]
            .0
            .starts_with("INSERT INTO `people` (`name`, `email`) VALUES (?, ?), (?, ?)"));
        assert_eq!(statements[0].1.len(), 65_534);
        assert_eq!(statements[1].1.len(), 80_000 - 65_534);
    }
}
