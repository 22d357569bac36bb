//! Interactive change set review.

use std::cell::RefCell;
use std::io::{self, BufRead, StdinLock, Stdout, Write};

use serde_json::Value;
use tracing::warn;

use cumulus_stacks::{ChangeSetDecider, ChangeSetDecision};

const QUESTION: &str = "Execute(e), Delete (d), or Keep(k) change set? ";

/// Shows a change set and asks the operator what to do with it.
pub struct PromptDecider<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl PromptDecider<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    /// `None` when the input ends before a valid answer.
    fn prompt(&self, change_set: &Value) -> io::Result<Option<ChangeSetDecision>> {
        let mut output = self.output.borrow_mut();
        let mut input = self.input.borrow_mut();

        let summary = serde_yaml::to_string(change_set)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(output, "---------- Change Set ----------")?;
        write!(output, "{}", summary)?;
        writeln!(output, "--------------------------------")?;

        loop {
            write!(output, "{}", QUESTION)?;
            output.flush()?;

            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 {
                return Ok(None);
            }
            match ChangeSetDecision::from_answer(&answer) {
                Some(decision) => return Ok(Some(decision)),
                None => writeln!(output, "Valid answers: e, d, k")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> ChangeSetDecider for PromptDecider<R, W> {
    fn decide(&self, change_set: &Value) -> ChangeSetDecision {
        match self.prompt(change_set) {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                warn!("No answer given, keeping the change set");
                ChangeSetDecision::Keep
            }
            Err(e) => {
                warn!("Change set prompt failed: {}. Keeping the change set", e);
                ChangeSetDecision::Keep
            }
        }
    }
}
