use super::{
    errors::{StateMachineError, StateMachineResult},
    events::WorkflowEvent,
    states::WorkflowStatus,
};
use crate::models::{clamped_seconds, StageTransition, Workflow};
use chrono::{DateTime, Utc};

/// Outcome of a successfully applied event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
}

impl Transition {
    pub fn changed_status(&self) -> bool {
        self.from != self.to
    }
}

/// Pure transition rules for the video-production pipeline.
///
/// Stores call [`WorkflowStateMachine::apply`] while holding the record's lock
/// (or row lock), which makes every check-then-write atomic per workflow.
pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current: WorkflowStatus,
        event: &WorkflowEvent,
    ) -> StateMachineResult<WorkflowStatus> {
        use WorkflowEvent as E;
        use WorkflowStatus as S;

        if current.is_terminal() {
            return Err(StateMachineError::TerminalState {
                status: current.to_string(),
            });
        }

        let target = match (current, event) {
            // Avatar stage
            (S::Queued, E::AvatarStarted { .. }) => S::AvatarProcessing,
            (S::AvatarProcessing, E::AvatarStarted { .. }) => S::AvatarProcessing,
            (S::AvatarProcessing, E::AvatarCompleted { .. }) => S::AvatarCompleted,

            // Caption stage
            (S::AvatarCompleted, E::CaptionSubmitted { .. }) => S::CaptionProcessing,
            (S::CaptionProcessing, E::ExportRequested { .. }) => S::CaptionProcessing,
            (S::ExportPending, E::ExportRequested { .. }) => S::ExportPending,
            (S::CaptionProcessing, E::ExportPending) => S::ExportPending,
            (S::CaptionProcessing | S::ExportPending, E::CaptionExported { .. }) => {
                S::VideoProcessing
            }

            // Post-processing
            (S::VideoProcessing, E::Uploaded { .. }) => S::Posting,
            (S::Posting, E::Posted { .. }) => S::Completed,

            // Failure is reachable from every non-terminal state
            (_, E::Fail { .. }) => S::Failed,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        debug_assert!(target == current || current.can_transition_to(target));
        Ok(target)
    }

    /// Apply `event` to `workflow`, writing checkpoints and timestamps.
    ///
    /// Checkpoint URLs are only ever set, never cleared. On error the workflow
    /// is left untouched.
    pub fn apply(
        workflow: &mut Workflow,
        event: &WorkflowEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<Transition> {
        let from = workflow.status;
        let to = Self::determine_target_state(from, event)?;

        if let WorkflowEvent::ExportRequested { retry_window_secs } = event {
            if let Some(requested_at) = workflow.export_requested_at {
                let window = clamped_seconds(*retry_window_secs);
                if now.signed_duration_since(requested_at) < window {
                    return Err(StateMachineError::ExportAlreadyRequested { requested_at });
                }
            }
        }

        match event {
            WorkflowEvent::AvatarStarted { external_id } => {
                workflow.avatar_external_id = Some(external_id.clone());
                workflow.avatar_started_at.get_or_insert(now);
            }
            WorkflowEvent::AvatarCompleted { asset_url } => {
                workflow.avatar_asset_url = Some(asset_url.clone());
                workflow.avatar_completed_at = Some(now);
            }
            WorkflowEvent::CaptionSubmitted { project_id } => {
                workflow.caption_external_id = Some(project_id.clone());
                workflow.caption_submitted_at = Some(now);
            }
            WorkflowEvent::ExportRequested { .. } => {
                workflow.export_requested_at = Some(now);
            }
            WorkflowEvent::ExportPending => {
                workflow.export_requested_at.get_or_insert(now);
            }
            WorkflowEvent::CaptionExported { asset_url } => {
                workflow.caption_asset_url = Some(asset_url.clone());
                workflow.caption_completed_at = Some(now);
            }
            WorkflowEvent::Uploaded { final_asset_url } => {
                workflow.final_asset_url = Some(final_asset_url.clone());
                workflow.posting_at = Some(now);
            }
            WorkflowEvent::Posted {
                post_ids,
                platforms_used,
                scheduled_for,
            } => {
                workflow.post_ids = post_ids.clone();
                workflow.platforms_used = Some(*platforms_used);
                workflow.scheduled_for = *scheduled_for;
                workflow.completed_at = Some(now);
            }
            WorkflowEvent::Fail { error } => {
                workflow.error = Some(error.clone());
                workflow.failed_at = Some(now);
            }
        }

        workflow.status = to;
        workflow.updated_at = now;
        workflow.history.push(StageTransition {
            from,
            to,
            event: event.event_type().to_string(),
            at: now,
        });

        Ok(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn workflow_in(status: WorkflowStatus) -> Workflow {
        let mut workflow = Workflow::new("ownerfi", "wf1");
        workflow.status = status;
        workflow
    }

    #[test]
    fn test_happy_path_walks_every_stage() {
        let mut wf = Workflow::new("ownerfi", "wf1");
        let now = Utc::now();
        let events = [
            WorkflowEvent::AvatarStarted { external_id: "v1".into() },
            WorkflowEvent::AvatarCompleted { asset_url: "https://x/avatar.mp4".into() },
            WorkflowEvent::CaptionSubmitted { project_id: "p1".into() },
            WorkflowEvent::ExportRequested { retry_window_secs: 300 },
            WorkflowEvent::CaptionExported { asset_url: "https://x/caption.mp4".into() },
            WorkflowEvent::Uploaded { final_asset_url: "https://cdn/final.mp4".into() },
            WorkflowEvent::Posted {
                post_ids: vec!["post-1".into()],
                platforms_used: 6,
                scheduled_for: None,
            },
        ];
        for event in &events {
            WorkflowStateMachine::apply(&mut wf, event, now).unwrap();
        }
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert_eq!(wf.avatar_asset_url.as_deref(), Some("https://x/avatar.mp4"));
        assert_eq!(wf.caption_asset_url.as_deref(), Some("https://x/caption.mp4"));
        assert_eq!(wf.final_asset_url.as_deref(), Some("https://cdn/final.mp4"));
        assert_eq!(wf.platforms_used, Some(6));
        assert_eq!(wf.history.len(), events.len());
    }

    #[test]
    fn test_failure_preserves_checkpoints() {
        let mut wf = workflow_in(WorkflowStatus::AvatarProcessing);
        let now = Utc::now();
        WorkflowStateMachine::apply(
            &mut wf,
            &WorkflowEvent::AvatarCompleted { asset_url: "https://x/video.mp4".into() },
            now,
        )
        .unwrap();
        WorkflowStateMachine::apply(&mut wf, &WorkflowEvent::fail_with_error("timeout"), now)
            .unwrap();

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.avatar_asset_url.as_deref(), Some("https://x/video.mp4"));
        assert_eq!(wf.error.as_deref(), Some("timeout"));
        assert!(wf.failed_at.is_some());
    }

    #[test]
    fn test_terminal_workflow_rejects_events() {
        let mut wf = workflow_in(WorkflowStatus::Failed);
        let err = WorkflowStateMachine::apply(&mut wf, &WorkflowEvent::fail_with_error("again"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StateMachineError::TerminalState { .. }));
        assert!(wf.history.is_empty());
    }

    #[test]
    fn test_export_request_respects_window() {
        let mut wf = workflow_in(WorkflowStatus::CaptionProcessing);
        let start = Utc::now();
        let event = WorkflowEvent::ExportRequested { retry_window_secs: 300 };

        let transition = WorkflowStateMachine::apply(&mut wf, &event, start).unwrap();
        assert!(!transition.changed_status());
        assert_eq!(wf.status, WorkflowStatus::CaptionProcessing);

        let err = WorkflowStateMachine::apply(&mut wf, &event, start + Duration::seconds(60))
            .unwrap_err();
        assert!(matches!(err, StateMachineError::ExportAlreadyRequested { .. }));

        WorkflowStateMachine::apply(&mut wf, &event, start + Duration::seconds(301)).unwrap();
    }

    #[test]
    fn test_unbounded_retry_window_does_not_overflow() {
        let mut wf = workflow_in(WorkflowStatus::CaptionProcessing);
        let start = Utc::now();
        let event = WorkflowEvent::ExportRequested { retry_window_secs: u64::MAX };

        WorkflowStateMachine::apply(&mut wf, &event, start).unwrap();
        let err = WorkflowStateMachine::apply(&mut wf, &event, start + Duration::days(3_650))
            .unwrap_err();
        assert!(matches!(err, StateMachineError::ExportAlreadyRequested { .. }));
    }

    #[test]
    fn test_caption_events_rejected_before_avatar_checkpoint() {
        let mut wf = workflow_in(WorkflowStatus::AvatarProcessing);
        let err = WorkflowStateMachine::apply(
            &mut wf,
            &WorkflowEvent::CaptionExported { asset_url: "https://x".into() },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, StateMachineError::InvalidTransition { .. }));
        assert!(wf.caption_asset_url.is_none());
    }

    fn any_event() -> impl Strategy<Value = WorkflowEvent> {
        prop_oneof![
            "[a-z0-9]{1,8}".prop_map(|id| WorkflowEvent::AvatarStarted { external_id: id }),
            "[a-z0-9]{1,8}".prop_map(|u| WorkflowEvent::AvatarCompleted { asset_url: u }),
            "[a-z0-9]{1,8}".prop_map(|p| WorkflowEvent::CaptionSubmitted { project_id: p }),
            Just(WorkflowEvent::ExportRequested { retry_window_secs: 0 }),
            Just(WorkflowEvent::ExportPending),
            "[a-z0-9]{1,8}".prop_map(|u| WorkflowEvent::CaptionExported { asset_url: u }),
            "[a-z0-9]{1,8}".prop_map(|u| WorkflowEvent::Uploaded { final_asset_url: u }),
            Just(WorkflowEvent::Posted { post_ids: vec![], platforms_used: 0, scheduled_for: None }),
            "[a-z ]{1,12}".prop_map(|e| WorkflowEvent::Fail { error: e }),
        ]
    }

    proptest! {
        #[test]
        fn prop_checkpoints_never_cleared_and_edges_respected(events in proptest::collection::vec(any_event(), 0..24)) {
            let mut wf = Workflow::new("carz", "wf-prop");
            let now = Utc::now();
            for event in &events {
                let before = wf.clone();
                match WorkflowStateMachine::apply(&mut wf, event, now) {
                    Ok(t) => {
                        prop_assert!(t.from == t.to || t.from.can_transition_to(t.to));
                    }
                    Err(_) => prop_assert_eq!(&wf, &before),
                }
                if before.avatar_asset_url.is_some() { prop_assert!(wf.avatar_asset_url.is_some()); }
                if before.caption_asset_url.is_some() { prop_assert!(wf.caption_asset_url.is_some()); }
                if before.final_asset_url.is_some() { prop_assert!(wf.final_asset_url.is_some()); }
                if before.status.is_terminal() { prop_assert_eq!(wf.status, before.status); }
            }
        }
    }
}
