// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// Failures that end the session. Stale-surface results never show up here;
/// they are reported through `PresentStatus` and `resize_required`.
#[derive(Error, Debug)]
pub enum VkError {
    #[error("{op} failed: {result}")]
    Call { op: &'static str, result: vk::Result },

    #[error("device lost during {op}")]
    DeviceLost { op: &'static str },

    #[error("{what} still pending after {attempts} waits of {timeout:?}")]
    WaitTimeout {
        what: &'static str,
        attempts: u32,
        timeout: Duration,
    },

    #[error("surface negotiation failed: {0}")]
    Negotiation(String),

    #[error("device bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
}

impl VkError {
    pub fn call(op: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => VkError::DeviceLost { op },
            result => VkError::Call { op, result },
        }
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(self, VkError::DeviceLost { .. })
    }
}

pub type VkResultOf<T> = std::result::Result<T, VkError>;

/// Names the call a raw `VkResult` came from.
pub trait VkResultExt<T> {
    fn op(self, op: &'static str) -> VkResultOf<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn op(self, op: &'static str) -> VkResultOf<T> {
        self.map_err(|result| VkError::call(op, result))
    }
}
