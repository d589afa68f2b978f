//! Rendering of simulator output.
//!
//! Text output follows the classic format: reads print `x4: 40`, commits and
//! aborts print `T1 commit` / `T1 abort`, and `dump()` prints one line per
//! site. Verbose mode adds the reader to read lines and reports writes,
//! begins, blocks, the wait-for graph and deadlock victims. JSON output
//! writes every event as one JSON object per line.

use std::io::{self, Write};

use acdb::{AbortReason, BlockReason, Event, SiteDump, TransactionKind};
use serde::{Deserialize, Serialize};

/// How output is rendered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum JsonRecord<'a> {
    Event(&'a Event),
    Dump(&'a [SiteDump]),
}

/// Writes events and dumps to an output stream.
#[derive(Debug)]
pub struct OutputPrinter<W> {
    out: W,
    format: OutputFormat,
    verbose: bool,
}

impl<W: Write> OutputPrinter<W> {
    /// Create a printer writing to `out`.
    pub fn new(out: W, format: OutputFormat, verbose: bool) -> Self {
        Self {
            out,
            format,
            verbose,
        }
    }

    /// Print one event. Silent events print nothing.
    pub fn print_event(&mut self, event: &Event) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                if let Some(text) = render_event(event, self.verbose) {
                    writeln!(self.out, "{text}")?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &JsonRecord::Event(event))?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// Print events in order.
    pub fn print_events(&mut self, events: &[Event]) -> io::Result<()> {
        events.iter().try_for_each(|event| self.print_event(event))
    }

    /// Print the committed values of every site.
    pub fn print_dump(&mut self, dump: &[SiteDump]) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                for site in dump {
                    writeln!(self.out, "{}", render_site(site))?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &JsonRecord::Dump(dump))?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Text line(s) for an event, or `None` when it prints nothing at this
/// verbosity.
pub fn render_event(event: &Event, verbose: bool) -> Option<String> {
    match event {
        Event::Read {
            transaction,
            variable,
            value,
            ..
        } => Some(if verbose {
            format!("{variable}: {value} read by {transaction}")
        } else {
            format!("{variable}: {value}")
        }),
        Event::Committed { transaction } => Some(format!("{transaction} commit")),
        Event::Aborted { transaction, reason } => Some(if verbose {
            format!("{transaction} abort ({})", describe_abort(reason))
        } else {
            format!("{transaction} abort")
        }),
        _ if !verbose => None,
        Event::Wrote {
            transaction,
            variable,
            value,
        } => Some(format!("{value} written to {variable} by {transaction}")),
        Event::Began { transaction, kind } => Some(match kind {
            TransactionKind::ReadWrite => format!("{transaction} begins"),
            TransactionKind::ReadOnly => format!("{transaction} begins read-only"),
        }),
        Event::Blocked {
            transaction,
            reason,
        } => Some(format!("{transaction} blocked: {}", describe_block(reason))),
        Event::WaitsForGraph { edges } => {
            let mut text = String::from("waits for graph:");
            for (waiter, holder) in edges {
                text.push_str(&format!("\n{waiter} -> {holder}"));
            }
            Some(text)
        }
        Event::CycleDetected { cycle } => {
            let members: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            Some(format!("cycle detected: {}", members.join(" ")))
        }
        Event::DeadlockVictim { transaction } => Some(format!(
            "Choose the youngest transaction {transaction} to abort"
        )),
        Event::SiteFailed { site } => Some(format!("{site} failed")),
        Event::SiteRecovered { site } => Some(format!("{site} recovered")),
    }
}

/// `site 1 – x2: 20, x4: 40`
pub fn render_site(site: &SiteDump) -> String {
    let values: Vec<String> = site
        .values
        .iter()
        .map(|(variable, value)| format!("{variable}: {value}"))
        .collect();
    if values.is_empty() {
        site.site.to_string()
    } else {
        format!("{} – {}", site.site, values.join(", "))
    }
}

fn describe_abort(reason: &AbortReason) -> String {
    match reason {
        AbortReason::Deadlock => "deadlock".to_string(),
        AbortReason::SiteFailure { site } => format!("{site} failed after access"),
    }
}

fn describe_block(reason: &BlockReason) -> &'static str {
    match reason {
        BlockReason::PendingOperations => "earlier operations pending",
        BlockReason::QueuedBehind => "queued behind an earlier request",
        BlockReason::LockConflict => "lock conflict",
        BlockReason::NoAvailableCopy => "no available copy",
        BlockReason::NoValidSnapshot => "no valid snapshot",
    }
}

#[cfg(test)]
mod tests {
    use acdb::{SiteId, SiteStatus, TransactionId, VariableId};

    use super::*;

    const T1: TransactionId = TransactionId::new(1);

    fn read_event() -> Event {
        Event::Read {
            transaction: T1,
            variable: VariableId::new(4),
            value: 40,
            site: Some(SiteId::new(1)),
        }
    }

    #[test]
    fn test_read_and_outcomes() {
        assert_eq!(render_event(&read_event(), false).as_deref(), Some("x4: 40"));
        assert_eq!(
            render_event(&read_event(), true).as_deref(),
            Some("x4: 40 read by T1")
        );
        assert_eq!(
            render_event(&Event::Committed { transaction: T1 }, false).as_deref(),
            Some("T1 commit")
        );
        let abort = Event::Aborted {
            transaction: T1,
            reason: AbortReason::Deadlock,
        };
        assert_eq!(render_event(&abort, false).as_deref(), Some("T1 abort"));
        assert_eq!(
            render_event(&abort, true).as_deref(),
            Some("T1 abort (deadlock)")
        );
    }

    #[test]
    fn test_verbose_only_events() {
        let wrote = Event::Wrote {
            transaction: T1,
            variable: VariableId::new(6),
            value: 8,
        };
        assert_eq!(render_event(&wrote, false), None);
        assert_eq!(
            render_event(&wrote, true).as_deref(),
            Some("8 written to x6 by T1")
        );

        let graph = Event::WaitsForGraph {
            edges: vec![(T1, TransactionId::new(2)), (TransactionId::new(2), T1)],
        };
        assert_eq!(
            render_event(&graph, true).as_deref(),
            Some("waits for graph:\nT1 -> T2\nT2 -> T1")
        );

        let cycle = Event::CycleDetected {
            cycle: vec![T1, TransactionId::new(2)],
        };
        assert_eq!(
            render_event(&cycle, true).as_deref(),
            Some("cycle detected: T1 T2")
        );
    }

    #[test]
    fn test_render_site() {
        let site = SiteDump {
            site: SiteId::new(1),
            status: SiteStatus::Up,
            values: vec![(VariableId::new(2), 20), (VariableId::new(4), 40)],
        };
        assert_eq!(render_site(&site), "site 1 – x2: 20, x4: 40");
    }

    #[test]
    fn test_json_lines() {
        let mut printer = OutputPrinter::new(Vec::new(), OutputFormat::Json, false);
        printer
            .print_events(&[read_event(), Event::Committed { transaction: T1 }])
            .expect("write");
        let output = String::from_utf8(printer.into_inner()).expect("utf8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).expect("json");
            assert!(value.get("event").is_some());
        }
    }
}
