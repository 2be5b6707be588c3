// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Core types shared by the WSA client crates: the error taxonomy, the
//! per-variant capability table and the sweep entry record.

pub mod descriptor;
pub mod error;
pub mod sweep;
pub mod types;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use descriptor::{Bounds, DeviceDescriptor, DeviceVariant, ProductModel};
pub use error::{WsaError, WsaResult};
pub use sweep::SweepEntry;
pub use types::{Dwell, PllReference, RfGain, SweepStatus, TriggerLevel, TriggerType};
