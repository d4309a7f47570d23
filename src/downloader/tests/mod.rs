//! Downloader tests, grouped by the submodule they exercise.

use super::test_helpers::*;
use super::*;
use crate::config::{DownloadOptions, OrganizationScheme};
use crate::error::Error;
use crate::store::SnapshotStore;
use crate::types::{Event, ItemOutcome, MediaType, RunState, SkipReason};
use std::sync::Arc;
use std::time::Duration;

mod lifecycle;
