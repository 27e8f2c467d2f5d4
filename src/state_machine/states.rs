use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one video-production workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created by the external trigger, avatar job not yet submitted
    #[default]
    Queued,
    /// Avatar synthesis job in flight
    AvatarProcessing,
    /// Avatar asset checkpointed, caption project not yet created
    AvatarCompleted,
    /// Caption project in flight
    CaptionProcessing,
    /// Export requested against the caption project
    ExportPending,
    /// Final caption asset checkpointed, post-processing dispatched
    VideoProcessing,
    /// Durable copy uploaded, scheduling in progress
    Posting,
    /// Posted to every platform
    Completed,
    /// Stopped with a recorded cause; checkpoints preserved
    Failed,
}

impl WorkflowStatus {
    /// All statuses in pipeline order, `Failed` last
    pub const ALL: [WorkflowStatus; 9] = [
        Self::Queued,
        Self::AvatarProcessing,
        Self::AvatarCompleted,
        Self::CaptionProcessing,
        Self::ExportPending,
        Self::VideoProcessing,
        Self::Posting,
        Self::Completed,
        Self::Failed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States in which the avatar webhook may still act
    pub fn accepts_avatar_events(&self) -> bool {
        matches!(self, Self::Queued | Self::AvatarProcessing)
    }

    /// States in which the caption webhook may still act
    pub fn accepts_caption_events(&self) -> bool {
        matches!(self, Self::CaptionProcessing | Self::ExportPending)
    }

    /// Forward edges of the pipeline graph, excluding the universal `Failed` edge
    pub fn successors(&self) -> &'static [WorkflowStatus] {
        match self {
            Self::Queued => &[Self::AvatarProcessing],
            Self::AvatarProcessing => &[Self::AvatarCompleted],
            Self::AvatarCompleted => &[Self::CaptionProcessing],
            Self::CaptionProcessing => &[Self::ExportPending, Self::VideoProcessing],
            Self::ExportPending => &[Self::VideoProcessing],
            Self::VideoProcessing => &[Self::Posting],
            Self::Posting => &[Self::Completed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Whether `next` is reachable from this status in one step
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successors().contains(&next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::AvatarProcessing => "avatar_processing",
            Self::AvatarCompleted => "avatar_completed",
            Self::CaptionProcessing => "caption_processing",
            Self::ExportPending => "export_pending",
            Self::VideoProcessing => "video_processing",
            Self::Posting => "posting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid workflow status: {s}"))
    }
}
