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

//! Transaction, Transaction2 and NtTransact reassembly state.

use crate::smb::events::SMBEvent;
use crate::smb::smb1_records::*;

/// Largest parameter plus data total that is buffered.
pub const SMB_TRANS_BUF_MAX: usize = 16 * 1024 * 1024;

// Transaction subcommands on named pipes
pub const TRANS_SET_NMPIPE_STATE:   u16 = 0x0001;
pub const TRANS_TRANSACT_NMPIPE:    u16 = 0x0026;
pub const TRANS_READ_NMPIPE:        u16 = 0x0036;
pub const TRANS_WRITE_NMPIPE:       u16 = 0x0037;

pub const TRANS2_OPEN2:             u16 = 0x0000;
pub const NT_TRANSACT_CREATE:       u16 = 0x0001;

/// Pipe state bits of SET_NMPIPE_STATE: read mode message.
pub const SMB_PIPE_READ_MODE_MESSAGE: u16 = 0x0100;

#[derive(Debug, Default)]
pub struct TransTracker {
    pub smb_com: u8,
    pub subcom: u16,
    pub one_way: bool,
    pub disconnect_tid: bool,
    /// Read mode asked for by SET_NMPIPE_STATE, true for byte mode.
    pub pipe_byte_mode: Option<bool>,

    pub tdcnt: u32,
    pub dsent: u32,
    pub dbuf: Vec<u8>,
    pub tpcnt: u32,
    pub psent: u32,
    pub pbuf: Vec<u8>,
    /// Fragments are copied into the buffers.
    pub buffered: bool,

    pub request_done: bool,
    pub response_started: bool,
    /// Memory charged for the buffers.
    pub mem: usize,
}

/// A fragment's count must fit in the total, at its displacement.
pub fn check_total_count(tcnt: u32, cnt: u32, disp: u32) -> Result<(), SMBEvent> {
    if cnt > tcnt {
        return Err(SMBEvent::TdcntLtDataSize);
    }
    if disp as u64 + cnt as u64 > tcnt as u64 {
        return Err(SMBEvent::DataSentGtTdcnt);
    }
    Ok(())
}

impl TransTracker {
    pub fn new(smb_com: u8, frag: &SmbTransFragment) -> TransTracker {
        TransTracker {
            smb_com,
            subcom: frag.subcom,
            one_way: frag.flags & SMB1_TRANS_FLAGS_NO_RESPONSE != 0,
            disconnect_tid: frag.flags & SMB1_TRANS_FLAGS_DISCONNECT_TID != 0,
            tdcnt: frag.total_data_cnt,
            tpcnt: frag.total_param_cnt,
            ..Default::default()
        }
    }

    /// Validate a fragment against the running totals. Continuation
    /// fragments may lower a total, but not below what was already sent.
    pub fn check_fragment(&mut self, frag: &SmbTransFragment, first: bool) -> Result<(), SMBEvent> {
        if !first {
            if frag.total_data_cnt < self.tdcnt {
                if frag.total_data_cnt < self.dsent {
                    return Err(SMBEvent::DataSentGtTdcnt);
                }
                self.tdcnt = frag.total_data_cnt;
            }
            if frag.total_param_cnt < self.tpcnt {
                if frag.total_param_cnt < self.psent {
                    return Err(SMBEvent::DataSentGtTdcnt);
                }
                self.tpcnt = frag.total_param_cnt;
            }
        }
        check_total_count(self.tdcnt, frag.data_cnt, frag.data_disp)?;
        check_total_count(self.tpcnt, frag.param_cnt, frag.param_disp)?;
        if self.dsent as u64 + frag.data_cnt as u64 > self.tdcnt as u64 ||
            self.psent as u64 + frag.param_cnt as u64 > self.tpcnt as u64
        {
            return Err(SMBEvent::DataSentGtTdcnt);
        }
        Ok(())
    }

    /// Fragment carries the whole exchange, nothing to buffer.
    pub fn is_single_fragment(&self, frag: &SmbTransFragment) -> bool {
        self.dsent == 0 && self.psent == 0 &&
            frag.data_cnt == self.tdcnt && frag.param_cnt == self.tpcnt
    }

    /// Bytes needed to buffer the exchange.
    pub fn buffer_size(&self) -> usize {
        self.tdcnt as usize + self.tpcnt as usize
    }

    /// Place a checked fragment at its displacement.
    pub fn add_fragment(&mut self, frag: &SmbTransFragment, params: &[u8], data: &[u8]) {
        if self.buffered {
            if self.dbuf.len() < self.tdcnt as usize {
                self.dbuf.resize(self.tdcnt as usize, 0);
            }
            if self.pbuf.len() < self.tpcnt as usize {
                self.pbuf.resize(self.tpcnt as usize, 0);
            }
            let d = frag.data_disp as usize;
            self.dbuf[d..d + data.len()].copy_from_slice(data);
            let p = frag.param_disp as usize;
            self.pbuf[p..p + params.len()].copy_from_slice(params);
        }
        self.dsent += frag.data_cnt;
        self.psent += frag.param_cnt;
        debug_validate_bug_on!(self.dsent > self.tdcnt);
        debug_validate_bug_on!(self.psent > self.tpcnt);
    }

    pub fn is_complete(&self) -> bool {
        self.dsent == self.tdcnt && self.psent == self.tpcnt
    }

    /// Switch to the response phase with the totals of the first
    /// response fragment. Returns the memory of the request buffers,
    /// which the caller releases.
    pub fn start_response(&mut self, frag: &SmbTransFragment) -> usize {
        self.response_started = true;
        self.tdcnt = frag.total_data_cnt;
        self.tpcnt = frag.total_param_cnt;
        self.dsent = 0;
        self.psent = 0;
        self.dbuf = Vec::new();
        self.pbuf = Vec::new();
        self.buffered = false;
        std::mem::take(&mut self.mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn frag(tdcnt: u32, dcnt: u32, ddisp: u32) -> SmbTransFragment {
        SmbTransFragment {
            total_data_cnt: tdcnt,
            data_cnt: dcnt,
            data_disp: ddisp,
            ..Default::default()
        }
    }

    #[test_case(100, 10, 0, Ok(()))]
    #[test_case(100, 10, 90, Ok(()))]
    #[test_case(100, 101, 0, Err(SMBEvent::TdcntLtDataSize))]
    #[test_case(100, 10, 91, Err(SMBEvent::DataSentGtTdcnt))]
    #[test_case(100, 1, u32::MAX, Err(SMBEvent::DataSentGtTdcnt))]
    fn test_check_total_count(tcnt: u32, cnt: u32, disp: u32, r: Result<(), SMBEvent>) {
        assert_eq!(check_total_count(tcnt, cnt, disp), r);
    }

    /// Sent counts only grow and never pass the first declared total.
    #[test]
    fn test_sent_bounded_by_total() {
        let first = frag(100, 40, 0);
        let mut tt = TransTracker::new(0x25, &first);
        tt.buffered = true;
        assert!(tt.check_fragment(&first, true).is_ok());
        tt.add_fragment(&first, &[], &[1; 40]);

        let seq = [frag(100, 40, 40), frag(100, 40, 80), frag(100, 20, 80)];
        let mut last = tt.dsent;
        let mut results = Vec::new();
        for f in seq.iter() {
            let r = tt.check_fragment(f, false);
            if r.is_ok() {
                tt.add_fragment(f, &[], &vec![2; f.data_cnt as usize]);
            }
            results.push(r);
            assert!(tt.dsent >= last);
            assert!(tt.dsent <= 100);
            last = tt.dsent;
        }
        assert_eq!(results, vec![Ok(()), Err(SMBEvent::DataSentGtTdcnt), Ok(())]);
        assert!(tt.is_complete());
        assert_eq!(&tt.dbuf[..40], &[1; 40][..]);
        assert_eq!(&tt.dbuf[80..], &[2; 20][..]);
    }

    #[test]
    fn test_lower_total() {
        let first = frag(100, 40, 0);
        let mut tt = TransTracker::new(0x25, &first);
        assert!(tt.check_fragment(&first, true).is_ok());
        tt.add_fragment(&first, &[], &[]);
        // lowered to what was sent plus this fragment
        assert!(tt.check_fragment(&frag(60, 20, 40), false).is_ok());
        assert_eq!(tt.tdcnt, 60);
        // cannot go below what was sent
        assert_eq!(tt.check_fragment(&frag(30, 0, 0), false), Err(SMBEvent::DataSentGtTdcnt));
        // a higher total is not adopted
        assert!(tt.check_fragment(&frag(200, 10, 40), false).is_ok());
        assert_eq!(tt.tdcnt, 60);
    }

    #[test]
    fn test_flags_and_response() {
        let mut f = frag(10, 10, 0);
        f.flags = SMB1_TRANS_FLAGS_NO_RESPONSE | SMB1_TRANS_FLAGS_DISCONNECT_TID;
        f.subcom = TRANS_WRITE_NMPIPE;
        let mut tt = TransTracker::new(0x25, &f);
        assert!(tt.one_way && tt.disconnect_tid);
        assert!(tt.is_single_fragment(&f));
        tt.mem = 20;
        assert_eq!(tt.start_response(&frag(5, 0, 0)), 20);
        assert_eq!(tt.tdcnt, 5);
        assert_eq!(tt.mem, 0);
        assert!(tt.response_started);
    }
}
