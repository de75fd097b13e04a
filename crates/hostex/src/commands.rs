//! Operator-invoked re-runs of the sync engine.

use std::str::FromStr;

use tracing::info;

use crate::{connector::HostexConnector, error::Error};

/// Manual sync triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Run a sync cycle now.
    Sync,
    /// Forget activity markers first so every conversation's detail is
    /// fetched again.
    Refresh,
    /// Re-run a cycle to correct room names and topics in bulk.
    Cleanup,
}

impl Trigger {
    pub const ALL: [Self; 3] = [Self::Sync, Self::Refresh, Self::Cleanup];

    pub fn command(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Refresh => "refresh",
            Self::Cleanup => "cleanup-rooms",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Sync => "Manually sync Hostex conversations",
            Self::Refresh => "Clear the activity cache and re-check every conversation",
            Self::Cleanup => "Re-sync every conversation to fix room names and topics",
        }
    }

    fn task_name(self) -> &'static str {
        match self {
            Self::Sync => "manual-sync",
            Self::Refresh => "manual-refresh",
            Self::Cleanup => "manual-cleanup",
        }
    }
}

impl FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = s.trim().trim_start_matches('!').to_ascii_lowercase();
        match command.as_str() {
            "sync" => Ok(Self::Sync),
            "refresh" => Ok(Self::Refresh),
            "cleanup-rooms" | "cleanup" => Ok(Self::Cleanup),
            other => Err(Error::invalid_input(format!("unknown command: {other}"))),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

pub fn help_text() -> String {
    Trigger::ALL
        .iter()
        .map(|t| format!("{} - {}", t.command(), t.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl HostexConnector {
    /// Spawn one supervised one-shot cycle per login and return the operator
    /// reply. Safe while a scheduled poll is in flight.
    pub fn trigger(&self, trigger: Trigger, login_ids: &[String]) -> String {
        let mut started = 0;
        for login_id in login_ids {
            let Ok(engine) = self.engine(login_id) else {
                continue;
            };

            if trigger == Trigger::Refresh {
                let cleared = engine.state().clear_activity();
                info!(login_id = %login_id, cleared, "cleared hostex activity cache");
            }

            info!(login_id = %login_id, trigger = %trigger, "manual hostex sync triggered");
            self.spawn_supervised(login_id, trigger.task_name(), async move {
                let report = engine.poll_once().await?;
                info!(
                    login_id = %engine.login_id(),
                    ?report,
                    "manual hostex sync finished"
                );
                Ok(())
            });
            started += 1;
        }

        if started == 0 {
            return "No active logins found".to_string();
        }
        let logins = if started == 1 { "login" } else { "logins" };
        match trigger {
            Trigger::Sync => format!("Sync started for {started} Hostex {logins}."),
            Trigger::Refresh => format!(
                "Activity cache cleared; full re-check started for {started} Hostex {logins}."
            ),
            Trigger::Cleanup => {
                format!("Room cleanup sync started for {started} Hostex {logins}.")
            },
        }
    }

    /// Parse and run an operator command against every active login.
    pub fn handle_command(&self, command: &str) -> String {
        match command.parse::<Trigger>() {
            Ok(trigger) => self.trigger(trigger, &self.login_ids()),
            Err(_) => format!("Unknown command.\n{}", help_text()),
        }
    }
}
