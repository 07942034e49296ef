use super::workload::WorkloadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
    Remove { force: bool },
}

impl LifecycleOp {
    /// Imperative form, used in refusal and failure messages.
    pub fn verb(self) -> &'static str {
        match self {
            LifecycleOp::Start => "start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Restart => "restart",
            LifecycleOp::Pause => "pause",
            LifecycleOp::Unpause => "unpause",
            LifecycleOp::Remove { .. } => "remove",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            LifecycleOp::Start => "Started",
            LifecycleOp::Stop => "Stopped",
            LifecycleOp::Restart => "Restarted",
            LifecycleOp::Pause => "Paused",
            LifecycleOp::Unpause => "Unpaused",
            LifecycleOp::Remove { .. } => "Removed",
        }
    }

    /// Whether the operation makes sense for a workload currently showing
    /// `status`. The error names the status that blocks it.
    pub fn check(self, status: WorkloadStatus) -> Result<(), String> {
        let allowed = match self {
            LifecycleOp::Start => !status.is_running(),
            LifecycleOp::Stop | LifecycleOp::Pause | LifecycleOp::Restart => status.is_running(),
            LifecycleOp::Unpause => status == WorkloadStatus::Paused,
            LifecycleOp::Remove { .. } => !status.is_running(),
        };
        if allowed {
            Ok(())
        } else {
            Err(format!("container is {}", status.label()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRequest {
    pub id: String,
    pub name: String,
    pub status: WorkloadStatus,
    pub op: LifecycleOp,
}

impl LifecycleRequest {
    /// Validates the request against the displayed status. On refusal the
    /// error is the status line to show the user.
    pub fn validate(&self) -> Result<(), String> {
        self.op
            .check(self.status)
            .map_err(|reason| format!("Cannot {} {}: {reason}", self.op.verb(), self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleResult {
    Done { op: LifecycleOp, name: String },
    Failed { op: LifecycleOp, name: String, error: String },
}

impl LifecycleResult {
    pub fn message(&self) -> String {
        match self {
            LifecycleResult::Done { op, name } => format!("{} {name}", op.past_tense()),
            LifecycleResult::Failed { op, name, error } => {
                format!("Failed to {} {name}: {error}", op.verb())
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleResult::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: WorkloadStatus, op: LifecycleOp) -> LifecycleRequest {
        LifecycleRequest {
            id: "abc".into(),
            name: "web-1".into(),
            status,
            op,
        }
    }

    #[test]
    fn stop_requires_running() {
        assert!(request(WorkloadStatus::Running, LifecycleOp::Stop).validate().is_ok());
        assert_eq!(
            request(WorkloadStatus::Exited, LifecycleOp::Stop).validate(),
            Err("Cannot stop web-1: container is exited".to_string())
        );
    }

    #[test]
    fn start_and_remove_require_stopped() {
        assert!(request(WorkloadStatus::Exited, LifecycleOp::Start).validate().is_ok());
        assert!(request(WorkloadStatus::Created, LifecycleOp::Start).validate().is_ok());
        assert!(request(WorkloadStatus::Running, LifecycleOp::Start).validate().is_err());
        assert!(
            request(WorkloadStatus::Running, LifecycleOp::Remove { force: false })
                .validate()
                .is_err()
        );
        assert!(
            request(WorkloadStatus::Dead, LifecycleOp::Remove { force: false })
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn unpause_requires_paused() {
        assert!(request(WorkloadStatus::Paused, LifecycleOp::Unpause).validate().is_ok());
        assert!(request(WorkloadStatus::Running, LifecycleOp::Unpause).validate().is_err());
        assert!(request(WorkloadStatus::Paused, LifecycleOp::Pause).validate().is_err());
    }

    #[test]
    fn result_messages() {
        let done = LifecycleResult::Done {
            op: LifecycleOp::Stop,
            name: "web-1".into(),
        };
        assert_eq!(done.message(), "Stopped web-1");
        assert!(done.is_success());

        let failed = LifecycleResult::Failed {
            op: LifecycleOp::Pause,
            name: "db".into(),
            error: "not found".into(),
        };
        assert_eq!(failed.message(), "Failed to pause db: not found");
        assert!(!failed.is_success());
    }
}
