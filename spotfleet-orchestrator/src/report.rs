use chrono::{DateTime, Utc};
use spotfleet_common::{
    InstanceResult, ProvisioningReport, ProvisioningRequest, QuotaOutcome, ResultRecord, Summary,
};
use uuid::Uuid;

/// Collects one result per instance, in request order, and produces the report.
pub struct Aggregator {
    batch_id: Uuid,
    location: String,
    size: String,
    started_at: DateTime<Utc>,
    quota: QuotaOutcome,
    results: Vec<(String, InstanceResult)>,
}

impl Aggregator {
    pub fn new(request: &ProvisioningRequest, quota: QuotaOutcome) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            location: request.location.trim().to_string(),
            size: request.size.trim().to_string(),
            started_at: Utc::now(),
            quota,
            results: Vec::new(),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn record(&mut self, name: &str, result: InstanceResult) {
        self.results.push((name.to_string(), result));
    }

    pub fn finish(self) -> ProvisioningReport {
        let summary = summarize(self.results.iter().map(|(_, r)| r));
        let records = self
            .results
            .iter()
            .map(|(name, result)| ResultRecord::from_result(name, result))
            .collect();
        ProvisioningReport {
            batch_id: self.batch_id,
            location: self.location,
            size: self.size,
            started_at: self.started_at,
            finished_at: Utc::now(),
            quota: self.quota,
            records,
            summary,
        }
    }
}

pub fn summarize<'a>(results: impl IntoIterator<Item = &'a InstanceResult>) -> Summary {
    let mut summary = Summary::default();
    for result in results {
        summary.requested += 1;
        match result {
            InstanceResult::Succeeded { remediation, .. } => {
                summary.succeeded += 1;
                if remediation.is_some() {
                    summary.remediated += 1;
                }
            }
            InstanceResult::Failed { .. } => summary.failed += 1,
        }
    }
    summary
}
