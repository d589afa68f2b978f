//! Script language read by the simulator.
//!
//! One command per line, whitespace-insensitive:
//!
//! ```text
//! begin(T1)        beginRO(T2)      end(T1)
//! R(T1, x4)        W(T1, x6, 8)
//! fail(2)          recover(2)       dump()
//! ```
//!
//! Everything after `//` is a comment. Blank and comment-only lines parse
//! to `None`.

use acdb::{Operation, SiteId, Timestamp, TransactionId, Value, VariableId};

/// A parsed script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `begin(T)`
    Begin(TransactionId),
    /// `beginRO(T)`
    BeginReadOnly(TransactionId),
    /// `R(T, x)`
    Read(TransactionId, VariableId),
    /// `W(T, x, v)`
    Write(TransactionId, VariableId, Value),
    /// `end(T)`
    End(TransactionId),
    /// `fail(s)`
    Fail(SiteId),
    /// `recover(s)`
    Recover(SiteId),
    /// `dump()`
    Dump,
}

impl Command {
    /// The transaction operation this command issues, if it is one.
    pub fn to_operation(self, now: Timestamp) -> Option<Operation> {
        match self {
            Command::Begin(t) => Some(Operation::begin(t, now)),
            Command::BeginReadOnly(t) => Some(Operation::begin_read_only(t, now)),
            Command::Read(t, x) => Some(Operation::read(t, x, now)),
            Command::Write(t, x, v) => Some(Operation::write(t, x, v, now)),
            Command::End(t) => Some(Operation::commit(t, now)),
            Command::Fail(_) | Command::Recover(_) | Command::Dump => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Begin(t) => write!(f, "begin({t})"),
            Command::BeginReadOnly(t) => write!(f, "beginRO({t})"),
            Command::Read(t, x) => write!(f, "R({t}, {x})"),
            Command::Write(t, x, v) => write!(f, "W({t}, {x}, {v})"),
            Command::End(t) => write!(f, "end({t})"),
            Command::Fail(site) => write!(f, "fail({})", site.0),
            Command::Recover(site) => write!(f, "recover({})", site.0),
            Command::Dump => write!(f, "dump()"),
        }
    }
}

/// What is wrong with a script line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptErrorKind {
    /// Not of the form `name(args)`.
    #[error("malformed command `{0}`")]
    Malformed(String),

    /// Unknown command name.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// Known command, wrong number of arguments.
    #[error("`{command}` takes {expected} argument(s), got {found}")]
    WrongArity {
        /// Command name.
        command: String,
        /// Arguments it takes.
        expected: usize,
        /// Arguments given.
        found: usize,
    },

    /// Not a `T<n>` transaction id.
    #[error("invalid transaction id `{0}`")]
    BadTransaction(String),

    /// Not an `x<n>` variable.
    #[error("invalid variable `{0}`")]
    BadVariable(String),

    /// Not an integer.
    #[error("invalid number `{0}`")]
    BadNumber(String),
}

/// A script line that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ScriptError {
    /// 1-based line number.
    pub line: usize,
    /// What went wrong.
    pub kind: ScriptErrorKind,
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Command>, ScriptErrorKind> {
    let code = line.split("//").next().unwrap_or_default();
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(None);
    }

    let (name, rest) = compact
        .split_once('(')
        .ok_or_else(|| ScriptErrorKind::Malformed(compact.clone()))?;
    let arguments = rest
        .strip_suffix(')')
        .ok_or_else(|| ScriptErrorKind::Malformed(compact.clone()))?;
    let arguments: Vec<&str> = if arguments.is_empty() {
        Vec::new()
    } else {
        arguments.split(',').collect()
    };

    let command = match (name, arguments.as_slice()) {
        ("begin", [t]) => Command::Begin(parse_transaction(t)?),
        ("beginRO", [t]) => Command::BeginReadOnly(parse_transaction(t)?),
        ("R", [t, x]) => Command::Read(parse_transaction(t)?, parse_variable(x)?),
        ("W", [t, x, v]) => Command::Write(
            parse_transaction(t)?,
            parse_variable(x)?,
            parse_number(v)?,
        ),
        ("end", [t]) => Command::End(parse_transaction(t)?),
        ("fail", [s]) => Command::Fail(SiteId::new(parse_number(s)?)),
        ("recover", [s]) => Command::Recover(SiteId::new(parse_number(s)?)),
        ("dump", []) => Command::Dump,
        (name, found) => {
            return Err(match arity(name) {
                Some(expected) => ScriptErrorKind::WrongArity {
                    command: name.to_string(),
                    expected,
                    found: found.len(),
                },
                None => ScriptErrorKind::UnknownCommand(name.to_string()),
            });
        }
    };
    Ok(Some(command))
}

/// Parse a whole script, keeping the line number of every command.
pub fn parse_script(script: &str) -> Result<Vec<(usize, Command)>, ScriptError> {
    let mut commands = Vec::new();
    for (index, line) in script.lines().enumerate() {
        let parsed = parse_line(line).map_err(|kind| ScriptError {
            line: index + 1,
            kind,
        })?;
        if let Some(command) = parsed {
            commands.push((index + 1, command));
        }
    }
    Ok(commands)
}

fn arity(name: &str) -> Option<usize> {
    match name {
        "dump" => Some(0),
        "begin" | "beginRO" | "end" | "fail" | "recover" => Some(1),
        "R" => Some(2),
        "W" => Some(3),
        _ => None,
    }
}

fn parse_transaction(token: &str) -> Result<TransactionId, ScriptErrorKind> {
    token
        .strip_prefix('T')
        .and_then(|n| n.parse().ok())
        .map(TransactionId::new)
        .ok_or_else(|| ScriptErrorKind::BadTransaction(token.to_string()))
}

fn parse_variable(token: &str) -> Result<VariableId, ScriptErrorKind> {
    token
        .strip_prefix('x')
        .and_then(|n| n.parse().ok())
        .map(VariableId::new)
        .ok_or_else(|| ScriptErrorKind::BadVariable(token.to_string()))
}

fn parse_number<N: std::str::FromStr>(token: &str) -> Result<N, ScriptErrorKind> {
    token
        .parse()
        .map_err(|_| ScriptErrorKind::BadNumber(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_line(line).expect("valid line").expect("a command")
    }

    #[test]
    fn test_parse_every_command() {
        let t1 = TransactionId::new(1);
        let x4 = VariableId::new(4);
        assert_eq!(parse("begin(T1)"), Command::Begin(t1));
        assert_eq!(parse("beginRO(T1)"), Command::BeginReadOnly(t1));
        assert_eq!(parse("R(T1,x4)"), Command::Read(t1, x4));
        assert_eq!(parse("W(T1, x4, -8)"), Command::Write(t1, x4, -8));
        assert_eq!(parse("end(T1)"), Command::End(t1));
        assert_eq!(parse("fail(3)"), Command::Fail(SiteId::new(3)));
        assert_eq!(parse("recover(3)"), Command::Recover(SiteId::new(3)));
        assert_eq!(parse("dump()"), Command::Dump);
    }

    #[test]
    fn test_whitespace_and_comments() {
        assert_eq!(
            parse("  W ( T12 , x2 , 7 )   // write"),
            Command::Write(TransactionId::new(12), VariableId::new(2), 7)
        );
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   \t"), Ok(None));
        assert_eq!(parse_line("// only a comment"), Ok(None));
    }

    #[test]
    fn test_display_parses_back() {
        let commands = [
            Command::BeginReadOnly(TransactionId::new(3)),
            Command::Write(TransactionId::new(3), VariableId::new(6), 8),
            Command::Recover(SiteId::new(10)),
            Command::Dump,
        ];
        for command in commands {
            assert_eq!(parse(&command.to_string()), command);
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_line("begin T1"),
            Err(ScriptErrorKind::Malformed("beginT1".to_string()))
        );
        assert_eq!(
            parse_line("commit(T1)"),
            Err(ScriptErrorKind::UnknownCommand("commit".to_string()))
        );
        assert_eq!(
            parse_line("R(T1)"),
            Err(ScriptErrorKind::WrongArity {
                command: "R".to_string(),
                expected: 2,
                found: 1,
            })
        );
        assert_eq!(
            parse_line("R(1, x2)"),
            Err(ScriptErrorKind::BadTransaction("1".to_string()))
        );
        assert_eq!(
            parse_line("R(T1, y2)"),
            Err(ScriptErrorKind::BadVariable("y2".to_string()))
        );
        assert_eq!(
            parse_line("fail(two)"),
            Err(ScriptErrorKind::BadNumber("two".to_string()))
        );
    }

    #[test]
    fn test_parse_script_reports_line_numbers() {
        let script = "begin(T1)\n\n// comment\nR(T1, x2)\nbogus\n";
        let error = parse_script(script).expect_err("line 5 is invalid");
        assert_eq!(error.line, 5);

        let commands = parse_script("begin(T1)\n\nend(T1)\n").expect("valid script");
        assert_eq!(
            commands,
            vec![
                (1, Command::Begin(TransactionId::new(1))),
                (3, Command::End(TransactionId::new(1))),
            ]
        );
    }
}
