// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use crate::types::Submission;

/// The only persistence seam the core requires. Intake owns everything else
/// about the record store (schema, indices, HTTP exposure); the core calls
/// `create` once on admission and `update_analysis` once on a successful run.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, submission: &Submission) -> anyhow::Result<i64>;
    async fn update_analysis(&self, id: i64, text: &str) -> anyhow::Result<()>;
}

/// An in-memory `RecordStore` used by this crate's own tests and by
/// downstream crates (`selfheal-dispatch`) that need a store without a real
/// database. Shipped as ordinary (non-`cfg(test)`) code behind the crate's
/// public API so downstream crates can depend on it directly.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryRecordStore {
        pub next_id: Mutex<i64>,
        pub analyses: Mutex<Vec<(i64, String)>>,
    }

    impl InMemoryRecordStore {
        pub fn new(starting_id: i64) -> Self {
            Self {
                next_id: Mutex::new(starting_id),
                analyses: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryRecordStore {
        async fn create(&self, _submission: &Submission) -> anyhow::Result<i64> {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            Ok(id)
        }

        async fn update_analysis(&self, id: i64, text: &str) -> anyhow::Result<()> {
            self.analyses.lock().unwrap().push((id, text.to_string()));
            Ok(())
        }
    }
}
