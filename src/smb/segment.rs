/* Copyright (C) 2024 Open Information Security Foundation
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

//! Per direction reassembly of NetBIOS frames split over deliveries.

/// Bytes of the frame being assembled, starting at its NetBIOS header.
#[derive(Debug, Default)]
pub struct SmbSegBuffer {
    buf: Vec<u8>,
}

impl SmbSegBuffer {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes `fill` would take from `data` to hold `need` bytes.
    pub fn fill_size(&self, data: &[u8], need: usize) -> usize {
        std::cmp::min(need.saturating_sub(self.buf.len()), data.len())
    }

    /// Append from `data` until `need` bytes are held. Returns the number
    /// of bytes taken.
    pub fn fill(&mut self, data: &[u8], need: usize) -> usize {
        let n = self.fill_size(data, need);
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Drop `n` bytes from the front. Returns the number dropped.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = std::cmp::min(n, self.buf.len());
        self.buf.drain(..n);
        n
    }

    /// Empty the buffer, returning how many bytes it held.
    pub fn clear(&mut self) -> usize {
        let n = self.buf.len();
        self.buf = Vec::new();
        n
    }

    /// Move the contents out, to be evaluated while the session is
    /// borrowed mutably. Pair with `restore`.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn restore(&mut self, buf: Vec<u8>) {
        self.buf = buf;
    }
}
