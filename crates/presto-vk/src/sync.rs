// SPDX-License-Identifier: CEPL-1.0
//! Timeline counters and bounded CPU waits.
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use tracing::warn;

use crate::error::{VkError, VkResultExt, VkResultOf};
use crate::gpu::{Gpu, SemaphoreOp};

/// How long a CPU-side wait may block before it is treated as a hang.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Timeout of a single wait call.
    pub timeout: Duration,
    /// Timeouts tolerated before giving up. Zero behaves like one.
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_attempts: 8,
        }
    }
}

impl WaitPolicy {
    pub fn timeout_ns(&self) -> u64 {
        u64::try_from(self.timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Repeats `attempt` while it reports `TIMEOUT` or `NOT_READY`.
///
/// Any other error is returned at once, so a lost device is never retried.
/// Running out of attempts yields `VkError::WaitTimeout`.
pub fn retry_wait<T>(
    what: &'static str,
    policy: WaitPolicy,
    mut attempt: impl FnMut(u64) -> VkResult<T>,
) -> VkResultOf<T> {
    let attempts = policy.max_attempts.max(1);
    for n in 1..=attempts {
        match attempt(policy.timeout_ns()) {
            Ok(v) => return Ok(v),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                warn!(attempt = n, of = attempts, "{what} not ready after {:?}", policy.timeout);
            }
            Err(e) => return Err(VkError::call(what, e)),
        }
    }
    Err(VkError::WaitTimeout {
        what,
        attempts,
        timeout: policy.timeout,
    })
}

/// A timeline semaphore plus the last value handed out for it.
///
/// Every submission that touches the guarded resource waits on the current
/// value and signals the next one, so the counter only ever grows.
#[derive(Debug)]
pub struct Timeline {
    semaphore: vk::Semaphore,
    value: u64,
}

impl Timeline {
    pub fn create<G: Gpu>(gpu: &G) -> VkResultOf<Self> {
        let semaphore = gpu
            .create_timeline_semaphore(0)
            .op("create timeline semaphore")?;
        Ok(Self {
            semaphore,
            value: 0,
        })
    }

    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Last value scheduled to be signaled.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Reserves the next value: `(wait, signal)` with `signal == wait + 1`.
    pub fn advance(&mut self) -> (u64, u64) {
        let wait = self.value;
        self.value += 1;
        (wait, self.value)
    }

    pub fn wait_op(&self, value: u64, stage: vk::PipelineStageFlags2) -> SemaphoreOp {
        SemaphoreOp::timeline(self.semaphore, value, stage)
    }

    pub fn wait_for<G: Gpu>(&self, gpu: &G, value: u64, policy: WaitPolicy) -> VkResultOf<()> {
        retry_wait("timeline wait", policy, |timeout| {
            gpu.wait_timeline(self.semaphore, value, timeout)
        })
    }

    /// Blocks until everything scheduled so far has completed.
    pub fn wait_idle<G: Gpu>(&self, gpu: &G, policy: WaitPolicy) -> VkResultOf<()> {
        self.wait_for(gpu, self.value, policy)
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if self.semaphore != vk::Semaphore::null() {
            gpu.destroy_semaphore(self.semaphore);
            self.semaphore = vk::Semaphore::null();
        }
    }
}
