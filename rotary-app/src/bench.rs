//! Console bench: drive the engine from typed commands.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `lift` | handset off hook |
//! | `hang` | handset on hook |
//! | `ring <caller>` | incoming call from `<caller>` |
//! | `say <text>` | feed `<text>` to the recognizer as a final hypothesis |
//! | `remote finish` / `remote fail` | far end ends the active (or pending) call |
//! | `state` | print the current lifecycle state |
//! | `quit` | shut down |

use std::sync::Arc;

use rotary_core::{
    CallStatus, HookState, LoopbackProvider, PhoneEngine, ScriptedRecognizer, SimulatedHardware,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BenchCommand {
    Lift,
    Hang,
    Ring(String),
    Say(String),
    Remote(CallStatus),
    State,
    Quit,
}

impl BenchCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(v, r)| (v, r.trim()))
            .unwrap_or((line, ""));

        match (verb.to_ascii_lowercase().as_str(), rest) {
            ("lift", "") => Ok(BenchCommand::Lift),
            ("hang", "") => Ok(BenchCommand::Hang),
            ("state", "") => Ok(BenchCommand::State),
            ("quit" | "exit", "") => Ok(BenchCommand::Quit),
            ("ring", caller) if !caller.is_empty() => Ok(BenchCommand::Ring(caller.to_string())),
            ("say", text) if !text.is_empty() => Ok(BenchCommand::Say(text.to_string())),
            ("remote", outcome) => match outcome.to_ascii_lowercase().as_str() {
                "finish" => Ok(BenchCommand::Remote(CallStatus::Finished)),
                "fail" => Ok(BenchCommand::Remote(CallStatus::Failed)),
                _ => Err("usage: remote <finish|fail>".into()),
            },
            ("ring", _) => Err("usage: ring <caller>".into()),
            ("say", _) => Err("usage: say <text>".into()),
            ("", _) => Err("empty command".into()),
            _ => Err(format!("unknown command: {line}")),
        }
    }
}

/// Simulated collaborators plus the engine they feed.
pub struct Bench {
    pub engine: Arc<PhoneEngine>,
    pub hardware: Arc<SimulatedHardware>,
    pub provider: Arc<LoopbackProvider>,
    pub recognizer: Arc<ScriptedRecognizer>,
}

/// What the console loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Continue(Option<String>),
    Quit,
}

impl Bench {
    pub fn execute(&self, command: BenchCommand) -> Reply {
        debug!(?command, "bench command");
        let note = match command {
            BenchCommand::Lift => {
                self.hardware.set_hook(HookState::OffHook);
                None
            }
            BenchCommand::Hang => {
                self.hardware.set_hook(HookState::OnHook);
                None
            }
            BenchCommand::Ring(caller) => {
                let call = self.provider.simulate_incoming(&caller);
                Some(format!("incoming call {}", call.id))
            }
            BenchCommand::Say(text) => {
                if self.recognizer.say(&text) {
                    None
                } else {
                    Some("nobody is listening".to_string())
                }
            }
            BenchCommand::Remote(status) => {
                let calls = self.engine.calls();
                match calls.active_call().or_else(|| calls.pending_call()) {
                    Some(call) => {
                        self.provider.simulate_status(call.id, status);
                        None
                    }
                    None => Some("no call to end".to_string()),
                }
            }
            BenchCommand::State => Some(self.engine.state().to_string()),
            BenchCommand::Quit => return Reply::Quit,
        };
        Reply::Continue(note)
    }
}
