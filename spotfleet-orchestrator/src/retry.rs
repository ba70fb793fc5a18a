use std::time::Duration;

/// Fixed-delay retry budget. Control-plane propagation is not adaptive, so neither is this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_secs(delay_secs),
        }
    }

    pub fn immediate(self) -> Self {
        Self {
            delay: Duration::ZERO,
            ..self
        }
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    /// Polls while a cross-location group is being deleted.
    pub group_deletion: RetryPolicy,
    /// Network creation right after the group was created.
    pub propagation: RetryPolicy,
    pub public_ip: RetryPolicy,
    /// Wait used by the public address ladder when the group has not propagated yet.
    pub public_ip_propagation_delay: Duration,
    pub interface: RetryPolicy,
    /// Pause between a remediation cleanup and the resubmission.
    pub remediation: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            group_deletion: RetryPolicy::new(30, 10),
            propagation: RetryPolicy::new(12, 15),
            public_ip: RetryPolicy::new(5, 5),
            public_ip_propagation_delay: Duration::from_secs(30),
            interface: RetryPolicy::new(3, 5),
            remediation: RetryPolicy::new(1, 10),
        }
    }
}

impl RetryPolicies {
    /// Same attempt counts, no sleeping. For tests and dry runs.
    pub fn immediate() -> Self {
        let d = Self::default();
        Self {
            group_deletion: d.group_deletion.immediate(),
            propagation: d.propagation.immediate(),
            public_ip: d.public_ip.immediate(),
            public_ip_propagation_delay: Duration::ZERO,
            interface: d.interface.immediate(),
            remediation: d.remediation.immediate(),
        }
    }
}
