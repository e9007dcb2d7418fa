use console::{style, Term};
use std::path::Path;
use std::{env, fmt::Display};

use crate::mutant::{MutantOutcome, Mutation};

/// Terminal frontend for human-facing output.
///
/// Machine output (the JSON summary) never goes through here. In `--json`
/// mode every human line moves to stderr so stdout stays parseable. ANSI
/// styling is opt-out twice over: it needs the human stream to be an
/// interactive terminal, and it honours `NO_COLOR` and `CI`.
#[derive(Debug)]
pub struct Ui {
    /// Where human lines go: stdout normally, stderr under `--json`.
    human: Term,

    /// Always stderr; carries error text regardless of mode.
    diag: Term,

    styled: bool,

    /// Swallow everything; only unit tests set this.
    muted: bool,
}

impl Ui {
    pub fn new(json: bool) -> Self {
        let human = if json { Term::stderr() } else { Term::stdout() };
        let diag = Term::stderr();

        let plain_requested = env::var_os("NO_COLOR").is_some() || env::var_os("CI").is_some();
        // Styling keys off the stream human lines actually land on, so a
        // redirected stdout never receives escape codes.
        let styled = human.is_term() && !plain_requested;

        Self {
            human,
            diag,
            styled,
            muted: false,
        }
    }

    /// A `Ui` that prints nothing, for quiet unit tests.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            human: Term::stdout(),
            diag: Term::stderr(),
            styled: false,
            muted: true,
        }
    }

    fn emit(&self, target: &Term, text: &str) {
        if !self.muted {
            let _ = target.write_line(text);
        }
    }

    pub fn line(&self, msg: impl Display) {
        self.emit(&self.human, &msg.to_string());
    }

    pub fn title(&self, msg: impl Display) {
        let text = msg.to_string();
        if self.styled {
            self.emit(&self.human, &style(text).bold().to_string());
        } else {
            self.emit(&self.human, &text);
        }
    }

    pub fn error(&self, msg: impl Display) {
        let text = msg.to_string();
        if self.styled {
            self.emit(&self.diag, &style(text).red().bold().to_string());
        } else {
            self.emit(&self.diag, &text);
        }
    }

    /// Per-mutant progress line.
    ///
    /// The unstyled wording is stable; integration tests grep for it with
    /// NO_COLOR set.
    pub fn mutant_progress(&self, m: &Mutation, path: &Path) {
        let (badge, verdict) = match m.outcome {
            MutantOutcome::Killed => ("caught", "killed by a reaching test"),
            MutantOutcome::Survived => ("missed", "survived its reaching tests"),
            MutantOutcome::NotRun => return,
        };

        if !self.styled {
            self.line(format!("mutant {}: {verdict}", m.id));
            return;
        }

        let badge = if m.outcome == MutantOutcome::Killed {
            style(badge).red().bold()
        } else {
            style(badge).green().bold()
        };
        let elapsed = m
            .duration_ms
            .map_or_else(|| "?".to_string(), |ms| format!("{ms}ms"));
        self.line(format!(
            "{badge} #{} {} @ {}:{}..{} ({elapsed})",
            m.id,
            m.operator.name,
            path.display(),
            m.stmt_span.start,
            m.stmt_span.end,
        ));
    }

    /// One surviving mutant: header, then the old and new statement text in
    /// contrasting colors.
    pub fn survivor(&self, header: &str, original: &str, mutated: &str) {
        self.line(header);
        if self.styled {
            self.emit(&self.human, &style(original).red().to_string());
            self.emit(&self.human, &style(mutated).green().to_string());
        } else {
            self.line(original);
            self.line(mutated);
        }
    }

    /// The final score line.
    pub fn score(&self, percent: usize) {
        let text = format!("MUTATION SCORE: {percent}%");
        if self.styled {
            self.emit(&self.human, &style(text).yellow().bold().to_string());
        } else {
            self.line(text);
        }
    }
}
