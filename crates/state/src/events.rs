/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Ring capacity; the oldest entry is dropped once full.
const MAX_ENTRIES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventSeverity {
    #[serde(rename = "OK")]
    Ok,
    Warning,
    Critical,
}

impl EventSeverity {
    pub fn as_redfish(self) -> &'static str {
        match self {
            EventSeverity::Ok => "OK",
            EventSeverity::Warning => "Warning",
            EventSeverity::Critical => "Critical",
        }
    }

    /// IPMI event direction/severity nibble used in synthesized SEL records.
    pub fn sel_event_type(self) -> u8 {
        match self {
            EventSeverity::Ok => 0x01,
            EventSeverity::Warning => 0x02,
            EventSeverity::Critical => 0x04,
        }
    }
}

/// One synthesized event, served both as a Redfish LogService entry and as
/// an IPMI SEL record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelEntry {
    pub record_id: u16,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub source: String,
    pub message: String,
}

#[derive(Debug)]
struct EventRing {
    entries: VecDeque<SelEntry>,
    next_record_id: u16,
}

/// Bounded, append-only event store. Record ids are 16-bit and monotonic,
/// skipping 0x0000 and 0xFFFF which are reserved addresses in SEL reads.
#[derive(Debug)]
pub struct EventStore {
    ring: Mutex<EventRing>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(EventRing {
                entries: VecDeque::new(),
                next_record_id: 1,
            }),
        }
    }

    pub fn push(&self, severity: EventSeverity, source: &str, message: impl Into<String>) {
        let mut ring = self.ring.lock().expect("BUG: event ring lock poisoned");
        let record_id = ring.next_record_id;
        ring.next_record_id = match ring.next_record_id.wrapping_add(1) {
            0 | 0xFFFF => 1,
            next => next,
        };
        if ring.entries.len() == MAX_ENTRIES {
            ring.entries.pop_front();
        }
        ring.entries.push_back(SelEntry {
            record_id,
            timestamp: Utc::now(),
            severity,
            source: source.to_string(),
            message: message.into(),
        });
    }

    pub fn snapshot(&self) -> Vec<SelEntry> {
        self.ring
            .lock()
            .expect("BUG: event ring lock poisoned")
            .entries
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .expect("BUG: event ring lock poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, record_id: u16) -> Option<SelEntry> {
        self.ring
            .lock()
            .expect("BUG: event ring lock poisoned")
            .entries
            .iter()
            .find(|entry| entry.record_id == record_id)
            .cloned()
    }

    /// SEL-style addressed read: 0x0000 means first, 0xFFFF means last.
    /// Returns the entry and the id of the one after it (0xFFFF when none).
    pub fn get_sel(&self, record_id: u16) -> Option<(SelEntry, u16)> {
        let ring = self.ring.lock().expect("BUG: event ring lock poisoned");
        let index = match record_id {
            0x0000 => 0,
            0xFFFF => ring.entries.len().checked_sub(1)?,
            id => ring.entries.iter().position(|e| e.record_id == id)?,
        };
        let entry = ring.entries.get(index)?.clone();
        let next = ring
            .entries
            .get(index + 1)
            .map(|e| e.record_id)
            .unwrap_or(0xFFFF);
        Some((entry, next))
    }

    pub fn clear(&self) {
        self.ring
            .lock()
            .expect("BUG: event ring lock poisoned")
            .entries
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_monotonic_from_one() {
        let store = EventStore::new();
        store.push(EventSeverity::Ok, "Power", "powered on");
        store.push(EventSeverity::Warning, "Power", "upstream slow");
        let entries = store.snapshot();
        assert_eq!(entries[0].record_id, 1);
        assert_eq!(entries[1].record_id, 2);
    }

    #[test]
    fn ring_is_bounded_fifo() {
        let store = EventStore::new();
        for i in 0..(MAX_ENTRIES + 10) {
            store.push(EventSeverity::Ok, "Test", format!("event {i}"));
        }
        let entries = store.snapshot();
        assert_eq!(entries.len(), MAX_ENTRIES);
        // The ten oldest entries were evicted.
        assert_eq!(entries[0].record_id, 11);
    }

    #[test]
    fn sel_addressing_first_last_next() {
        let store = EventStore::new();
        assert!(store.get_sel(0x0000).is_none());
        store.push(EventSeverity::Ok, "Boot", "a");
        store.push(EventSeverity::Ok, "Boot", "b");
        store.push(EventSeverity::Ok, "Boot", "c");

        let (first, next) = store.get_sel(0x0000).expect("first entry");
        assert_eq!(first.message, "a");
        assert_eq!(next, 2);

        let (second, next) = store.get_sel(next).expect("second entry");
        assert_eq!(second.message, "b");
        assert_eq!(next, 3);

        let (last, next) = store.get_sel(0xFFFF).expect("last entry");
        assert_eq!(last.message, "c");
        assert_eq!(next, 0xFFFF);
    }

    #[test]
    fn clear_empties_but_keeps_id_sequence() {
        let store = EventStore::new();
        store.push(EventSeverity::Ok, "Test", "before clear");
        store.clear();
        assert!(store.is_empty());
        store.push(EventSeverity::Ok, "Test", "after clear");
        assert_eq!(store.snapshot()[0].record_id, 2);
    }
}
