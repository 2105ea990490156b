use serde::Serialize;

use super::state::Stage;
use super::state::StageStatus;

/// Where a streaming reply sits in the stock two-step progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPoint {
    Submitted,
    Partial,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePlanId {
    Analysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub stage_id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub id: StagePlanId,
    pub stages: &'static [StageSpec],
    pub submitted: &'static [StageStatus],
    pub partial: &'static [StageStatus],
}

const ANALYSIS_STAGES: [StageSpec; 6] = [
    StageSpec {
        stage_id: "1",
        label: "Request received and parsed successfully",
    },
    StageSpec {
        stage_id: "2",
        label: "Database connection established",
    },
    StageSpec {
        stage_id: "3",
        label: "Processing Q3 sales data aggregation...",
    },
    StageSpec {
        stage_id: "4",
        label: "Generating visualization components",
    },
    StageSpec {
        stage_id: "5",
        label: "Compiling Excel workbook",
    },
    StageSpec {
        stage_id: "6",
        label: "Preparing PDF documentation",
    },
];

const ANALYSIS_SUBMITTED: [StageStatus; 6] = [
    StageStatus::Complete,
    StageStatus::Complete,
    StageStatus::Processing,
    StageStatus::Pending,
    StageStatus::Pending,
    StageStatus::Pending,
];
const ANALYSIS_PARTIAL: [StageStatus; 6] = [
    StageStatus::Complete,
    StageStatus::Complete,
    StageStatus::Complete,
    StageStatus::Processing,
    StageStatus::Pending,
    StageStatus::Pending,
];

const STAGE_PLANS: [StagePlan; 1] = [StagePlan {
    id: StagePlanId::Analysis,
    stages: &ANALYSIS_STAGES,
    submitted: &ANALYSIS_SUBMITTED,
    partial: &ANALYSIS_PARTIAL,
}];

pub fn stage_plan(id: StagePlanId) -> &'static StagePlan {
    match id {
        StagePlanId::Analysis => &STAGE_PLANS[0],
    }
}

impl StagePlan {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Status snapshot for a progress point. `Finished` is always all
    /// complete.
    pub fn snapshot(&self, point: ProgressPoint) -> Vec<StageStatus> {
        match point {
            ProgressPoint::Submitted => self.submitted.to_vec(),
            ProgressPoint::Partial => self.partial.to_vec(),
            ProgressPoint::Finished => vec![StageStatus::Complete; self.stages.len()],
        }
    }

    pub fn instantiate(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .zip(self.submitted)
            .map(|(spec, status)| Stage {
                id: spec.stage_id.to_string(),
                label: spec.label.to_string(),
                status: *status,
            })
            .collect()
    }
}
