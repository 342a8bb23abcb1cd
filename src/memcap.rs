/* Copyright (C) 2021-2024 Open Information Security Foundation
 *
 * You can copy, redistribute or modify this Program under the terms of
 * the GNU General Public License version 2 as published by the Free
 * Software Foundation.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * version 2 along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA
 * 02110-1301, USA.
 */

//! Bounded memory pool shared by all SMB sessions of one context.
//!
//! Sessions charge trackers and buffers against the pool before
//! allocating them. A refused charge means the tracker or buffer is
//! not created and that part of the session is not inspected.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MemCap {
    /// Upper bound in bytes, 0 for unlimited.
    limit: u64,
    used: AtomicU64,
}

impl MemCap {
    pub fn new(limit: u64) -> MemCap {
        MemCap {
            limit,
            used: AtomicU64::new(0),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Charge `size` bytes. Returns false and charges nothing if the
    /// charge would go over the limit.
    pub fn try_alloc(&self, size: usize) -> bool {
        let size = size as u64;
        if self.limit == 0 {
            self.used.fetch_add(size, Ordering::Relaxed);
            return true;
        }
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let new = match cur.checked_add(size) {
                Some(n) if n <= self.limit => n,
                _ => return false,
            };
            match self.used.compare_exchange_weak(cur, new, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Return `size` bytes to the pool.
    pub fn free(&self, size: usize) {
        let size = size as u64;
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let new = cur.saturating_sub(size);
            match self.used.compare_exchange_weak(cur, new, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcap_limit() {
        let m = MemCap::new(100);
        assert!(m.try_alloc(60));
        assert!(!m.try_alloc(41));
        assert_eq!(m.used(), 60);
        assert!(m.try_alloc(40));
        m.free(50);
        assert_eq!(m.used(), 50);
        m.free(500);
        assert_eq!(m.used(), 0);
    }

    #[test]
    fn test_memcap_unlimited() {
        let m = MemCap::new(0);
        assert!(m.try_alloc(usize::MAX / 2));
        m.free(usize::MAX / 2);
        assert_eq!(m.used(), 0);
    }
}
