use crate::contracts::ReplyAttachment;
use crate::contracts::ReplyFileKind;
use crate::contracts::ReplyOutcome;
use crate::contracts::ReplyPayload;
use crate::contracts::ReplyRequest;

/// Produces the final reply for a turn. Stands in for the chat backend.
pub trait ReplySource {
    fn name(&self) -> &'static str;

    fn reply(&self, request: &ReplyRequest) -> ReplyOutcome;
}

impl<T: ReplySource + ?Sized> ReplySource for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn reply(&self, request: &ReplyRequest) -> ReplyOutcome {
        (**self).reply(request)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedReplySource;

const SALES_SCRIPT: &str = "import pandas as pd
import matplotlib.pyplot as plt

# Load Q3 sales data
df = pd.read_csv('q3_sales.csv')

# Group by region
regional_sales = df.groupby('region')['revenue'].sum()

# Create visualization
plt.figure(figsize=(10, 6))
regional_sales.plot(kind='bar')
plt.title('Q3 Sales by Region')
plt.ylabel('Revenue ($)')
plt.show()";

impl ReplySource for SimulatedReplySource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn reply(&self, request: &ReplyRequest) -> ReplyOutcome {
        ReplyOutcome {
            payload: simulated_payload(),
            logs: vec![format!(
                "simulated reply prepared for turn {}",
                request.turn_id
            )],
            source: self.name(),
        }
    }
}

pub fn simulated_payload() -> ReplyPayload {
    ReplyPayload {
        content: "Perfect! I've completed the comprehensive analysis of your Q3 sales data. \
                  Here's your detailed breakdown by region with all the requested deliverables."
            .to_string(),
        attachments: vec![
            ReplyAttachment::Chart {
                title: "Q3 Sales by Region".to_string(),
                categories: ["North", "South", "East", "West", "Central"]
                    .map(str::to_string)
                    .to_vec(),
                values: vec![820, 932, 901, 934, 1290],
            },
            ReplyAttachment::File {
                name: "Q3_Sales_Summary.pdf".to_string(),
                size: "1.2 MB".to_string(),
                kind: ReplyFileKind::Pdf,
            },
            ReplyAttachment::File {
                name: "Q3_Raw_Data.xlsx".to_string(),
                size: "856 KB".to_string(),
                kind: ReplyFileKind::Excel,
            },
            ReplyAttachment::Code {
                language: "python".to_string(),
                source: SALES_SCRIPT.to_string(),
            },
        ],
        follow_ups: vec![
            "Show me the monthly breakdown".to_string(),
            "Compare with Q2 results".to_string(),
            "Analyze top performing products".to_string(),
        ],
    }
}
