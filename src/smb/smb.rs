/* Copyright (C) 2017-2024 Open Information Security Foundation
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

//! Session state and the per direction data state machine.
//!
//! Each direction walks NetBIOS frames through a small state machine:
//! the 4 byte NetBIOS header is checked first, then the NetBIOS header
//! and SMB header together, then the whole frame is handed to the SMB1
//! command layer. Every decision is taken on a fixed size window at the
//! start of the frame, so it does not matter how the stream was cut into
//! deliveries. Bytes of a frame that is not complete in the current
//! delivery are held in a per direction segmentation buffer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::conf::SMBConfig;
use crate::direction::Direction;
use crate::memcap::MemCap;

use crate::smb::dcerpc::*;
use crate::smb::events::*;
use crate::smb::nbss_records::*;
use crate::smb::policy::{ChainTable, Policy};
use crate::smb::segment::SmbSegBuffer;
use crate::smb::session::*;
use crate::smb::smb1::*;
use crate::smb::validate::{ByteSet, CommandTable};

pub const SMB_NTSTATUS_SUCCESS:                    u32 = 0;
pub const SMB_NTSTATUS_BUFFER_OVERFLOW:            u32 = 0x80000005;
pub const SMB_NTSTATUS_INVALID_DEVICE_REQUEST:     u32 = 0xc0000010;
pub const SMB_NTSTATUS_MORE_PROCESSING_REQUIRED:   u32 = 0xc0000016;
pub const SMB_NTSTATUS_ACCESS_DENIED:              u32 = 0xc0000022;
pub const SMB_NTSTATUS_RANGE_NOT_LOCKED:           u32 = 0xc000007e;
pub const SMB_NTSTATUS_PIPE_BROKEN:                u32 = 0xc000014b;

pub const SMB_NTSTATUS_SEVERITY_MASK:              u32 = 0xc0000000;
pub const SMB_NTSTATUS_SEVERITY_ERROR:             u32 = 0xc0000000;

// DOS error classes and codes, for sessions without NT status codes
pub const SMB_ERRCLASS_SUCCESS:                    u8 = 0x00;
pub const SMB_ERRCLASS_DOS:                        u8 = 0x01;
pub const SMB_ERRCLASS_SRV:                        u8 = 0x02;

pub const SMB_ERRDOS_BADFUNC:                      u16 = 1;
pub const SMB_ERRDOS_NOTLOCKED:                    u16 = 158;
pub const SMB_ERRDOS_BADPIPE:                      u16 = 230;
pub const SMB_ERRDOS_MOREDATA:                     u16 = 234;

/// What the engine needs from its surroundings: somewhere to send alerts
/// and a DCE/RPC interpreter for named pipe payload.
pub trait SmbHost: AlertSink + DceRpcHandler {}

impl<T: AlertSink + DceRpcHandler> SmbHost for T {}

/// Tables built once and shared by all sessions.
pub struct SmbTables {
    pub commands: CommandTable,
    pub handlers: [Option<Smb1ComFunc>; 256],
    pub deprecated: ByteSet,
    pub chains: ChainTable,
}

impl SmbTables {
    pub fn new() -> SmbTables {
        SmbTables {
            commands: CommandTable::new(),
            handlers: smb1_handler_table(),
            deprecated: smb1_deprecated_commands(),
            chains: ChainTable::new(),
        }
    }
}

pub struct SMBContext {
    pub config: SMBConfig,
    pub tables: SmbTables,
    pub memcap: MemCap,
}

impl SMBContext {
    pub fn new(config: SMBConfig) -> Arc<SMBContext> {
        SCLogConfig!("smb: policy {}, max chain {}, memcap {}, client fingerprint {}, server fingerprint {}",
                config.policy, config.max_chain, config.memcap,
                config.fp_client, config.fp_server);
        let memcap = MemCap::new(config.memcap);
        Arc::new(SMBContext {
            config,
            tables: SmbTables::new(),
            memcap,
        })
    }
}

/// What the next NetBIOS frame of the session carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduState {
    Command,
    /// The next frame in this direction is raw read/write data with no
    /// SMB header.
    RawData(Direction),
}

bitflags! {
    #[derive(Default)]
    pub struct SsnStateFlags: u8 {
        const NEGOTIATED = 0x01;
        const FP_CLIENT  = 0x02;
        const FP_SERVER  = 0x04;
    }
}

/// Where a direction is in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    NetbiosHeader,
    SmbHeader,
    /// Frame start is suspect, scan the frame for an SMB marker.
    JunkScan,
    NetbiosPdu,
}

#[derive(Debug)]
pub struct SMBDirState {
    pub data_state: DataState,
    pub seg: SmbSegBuffer,
    /// Bytes still to skip, before anything else is looked at.
    pub ignore_bytes: u32,
    /// NetBIOS header plus payload of the current frame.
    pub frame_len: u32,
    /// Frame offset of the first buffered byte during a junk scan.
    pub scan_off: u32,
}

impl SMBDirState {
    fn new() -> SMBDirState {
        SMBDirState {
            data_state: DataState::NetbiosHeader,
            seg: SmbSegBuffer::default(),
            ignore_bytes: 0,
            frame_len: 0,
            scan_off: 0,
        }
    }

    /// Bytes the current state decides on. A junk scan decides as soon
    /// as a marker shows up, this is the most it looks at.
    fn need(&self) -> usize {
        match self.data_state {
            DataState::NetbiosHeader => NBSS_HDR_LEN,
            DataState::SmbHeader => NBSS_SMB_WINDOW,
            DataState::JunkScan => nbss_junk_region(self.frame_len),
            DataState::NetbiosPdu => self.frame_len as usize,
        }
    }

    fn start_junk_scan(&mut self) {
        self.data_state = DataState::JunkScan;
        self.scan_off = 0;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SMBStats {
    /// NetBIOS frames handed to the command layer.
    pub pdus: u64,
    pub ignored_bytes: u64,
    /// Frames rebuilt from more than one delivery.
    pub seg_reassembled: u64,
    /// Transactions rebuilt from more than one fragment.
    pub trans_reassembled: u64,
    pub bytes_forwarded_ts: u64,
    pub bytes_forwarded_tc: u64,
    pub chained: u64,
}

/// Outcome of evaluating a window in the current data state.
enum Step {
    /// State moved on, more bytes of the same frame are needed.
    Next,
    /// Skip this many bytes from the frame start.
    Skip(u32),
    /// Frame processed.
    Done,
}

pub struct SMBState {
    pub ctx: Arc<SMBContext>,

    /// Policy used for policy dependent decisions. Set from the config
    /// and overridden by the server fingerprint.
    pub policy: Policy,
    /// Client fingerprint, informational.
    pub client_policy: Option<Policy>,

    pub ssn_flags: SsnStateFlags,
    pub pdu_state: PduState,
    /// Request waiting for its raw data frame.
    pub raw_request: Option<RequestId>,

    pub dialects: Vec<String>,
    pub dialect_index: Option<u16>,
    pub max_outstanding: u16,

    pub dir: [SMBDirState; 2],

    pub uids: IdMap<()>,
    /// TIDs, and whether they are IPC$.
    pub tids: IdMap<bool>,
    pub pipes: PipeArena,
    pub pipes_by_fid: HashMap<u16, PipeId>,
    pub requests: RequestQueue,

    pub events: Vec<SmbAlert>,
    pub(crate) stats: SMBStats,
    mem_charged: usize,
}

impl SMBState {
    pub fn new(ctx: &Arc<SMBContext>) -> SMBState {
        SMBState {
            ctx: Arc::clone(ctx),
            policy: ctx.config.policy,
            client_policy: None,
            ssn_flags: SsnStateFlags::empty(),
            pdu_state: PduState::Command,
            raw_request: None,
            dialects: Vec::new(),
            dialect_index: None,
            max_outstanding: ctx.config.max_outstanding,
            dir: [SMBDirState::new(), SMBDirState::new()],
            uids: IdMap::default(),
            tids: IdMap::default(),
            pipes: PipeArena::default(),
            pipes_by_fid: HashMap::new(),
            requests: RequestQueue::default(),
            events: Vec::new(),
            stats: SMBStats::default(),
            mem_charged: 0,
        }
    }

    pub fn stats(&self) -> &SMBStats {
        &self.stats
    }

    /// Memory this session holds against the shared memcap.
    pub fn mem_charged(&self) -> usize {
        self.mem_charged
    }

    /// Charge the shared memcap. Raises `Memcap` when refused.
    pub fn mem_alloc(&mut self, size: usize) -> bool {
        if self.ctx.memcap.try_alloc(size) {
            self.mem_charged += size;
            return true;
        }
        SCLogDebug!("memcap refused {} bytes", size);
        self.set_event_args(SMBEvent::Memcap, vec![AlertArg::Int(size as u64)]);
        false
    }

    pub fn mem_free(&mut self, size: usize) {
        let size = std::cmp::min(size, self.mem_charged);
        self.ctx.memcap.free(size);
        self.mem_charged -= size;
    }

    /// Client to server bytes.
    pub fn parse_request(&mut self, data: &[u8], host: &mut dyn SmbHost) {
        self.parse_data(Direction::ToServer, data, host);
        self.flush_events(host);
    }

    /// Server to client bytes.
    pub fn parse_response(&mut self, data: &[u8], host: &mut dyn SmbHost) {
        self.parse_data(Direction::ToClient, data, host);
        self.flush_events(host);
    }

    fn add_nbss_events(&mut self, events: Vec<SMBEvent>) {
        for e in events {
            self.set_event(e);
        }
    }

    fn seg_consume(&mut self, d: usize, n: usize) -> usize {
        let n = self.dir[d].seg.consume(n);
        self.mem_free(n);
        n
    }

    fn reset_dir(&mut self, d: usize) {
        let n = self.dir[d].seg.clear();
        self.mem_free(n);
        self.dir[d].data_state = DataState::NetbiosHeader;
        self.dir[d].ignore_bytes = 0;
        self.dir[d].scan_off = 0;
    }

    /// Scan the current frame for an SMB marker. Returns the bytes taken
    /// from `cur` and whether the scan came to a decision. Only a short
    /// tail of the frame is buffered between deliveries.
    fn junk_scan(&mut self, d: usize, cur: &[u8]) -> (usize, bool) {
        let frame_len = self.dir[d].frame_len;
        let off = self.dir[d].scan_off as usize;
        let region = nbss_junk_region(frame_len);

        if self.dir[d].seg.is_empty() {
            let view = &cur[..std::cmp::min(cur.len(), region - off)];
            match nbss_junk_scan(view, off, frame_len) {
                JunkScan::Skip(n) => {
                    self.dir[d].ignore_bytes = n;
                    self.dir[d].data_state = DataState::NetbiosHeader;
                    (0, true)
                }
                JunkScan::More(drop) => {
                    let keep = view.len() - drop;
                    if !self.mem_alloc(keep) {
                        self.reset_dir(d);
                        return (view.len(), false);
                    }
                    self.dir[d].seg.fill(&view[drop..], keep);
                    self.dir[d].scan_off += drop as u32;
                    self.stats.ignored_bytes += drop as u64;
                    (view.len(), false)
                }
            }
        } else {
            let take = self.dir[d].seg.fill_size(cur, region - off);
            if take > 0 {
                if !self.mem_alloc(take) {
                    self.reset_dir(d);
                    return (cur.len(), false);
                }
                self.dir[d].seg.fill(cur, region - off);
            }
            let scan = nbss_junk_scan(self.dir[d].seg.as_slice(), off, frame_len);
            match scan {
                JunkScan::Skip(n) => {
                    self.dir[d].ignore_bytes = n;
                    self.dir[d].data_state = DataState::NetbiosHeader;
                    (take, true)
                }
                JunkScan::More(drop) => {
                    self.seg_consume(d, drop);
                    self.dir[d].scan_off += drop as u32;
                    self.stats.ignored_bytes += drop as u64;
                    (take, false)
                }
            }
        }
    }

    fn parse_data(&mut self, direction: Direction, data: &[u8], host: &mut dyn SmbHost) {
        let d = direction.index();
        let mut cur = data;
        SCLogDebug!("{} bytes {}, buffered {}", cur.len(), direction, self.dir[d].seg.len());

        loop {
            // bytes to skip come out of the buffer first, it holds the
            // start of the frame they are counted from
            if self.dir[d].ignore_bytes > 0 {
                let n = self.seg_consume(d, self.dir[d].ignore_bytes as usize);
                let n2 = std::cmp::min(self.dir[d].ignore_bytes as usize - n, cur.len());
                cur = &cur[n2..];
                self.dir[d].ignore_bytes -= (n + n2) as u32;
                self.stats.ignored_bytes += (n + n2) as u64;
                if self.dir[d].ignore_bytes > 0 {
                    break;
                }
            }

            if self.dir[d].data_state == DataState::JunkScan {
                let (taken, decided) = self.junk_scan(d, cur);
                cur = &cur[taken..];
                if !decided {
                    break;
                }
                SCLogDebug!("junk scan {}: skipping {} bytes", direction, self.dir[d].ignore_bytes);
                if cur.is_empty() && self.dir[d].seg.is_empty() && self.dir[d].ignore_bytes == 0 {
                    break;
                }
                continue;
            }

            let need = self.dir[d].need();
            let step = if self.dir[d].seg.is_empty() && cur.len() >= need {
                let step = self.process_window(direction, &cur[..need], false, host);
                if let Step::Done = step {
                    cur = &cur[need..];
                }
                step
            } else {
                if self.dir[d].seg.len() < need {
                    let take = self.dir[d].seg.fill_size(cur, need);
                    if take == 0 {
                        break;
                    }
                    if !self.mem_alloc(take) {
                        self.reset_dir(d);
                        break;
                    }
                    self.dir[d].seg.fill(cur, need);
                    cur = &cur[take..];
                    if self.dir[d].seg.len() < need {
                        break;
                    }
                }
                let buf = self.dir[d].seg.take();
                let step = self.process_window(direction, &buf[..need], true, host);
                self.dir[d].seg.restore(buf);
                if let Step::Done = step {
                    self.seg_consume(d, need);
                }
                step
            };

            match step {
                Step::Next => {}
                Step::Done => {
                    self.dir[d].data_state = DataState::NetbiosHeader;
                }
                Step::Skip(n) => {
                    SCLogDebug!("skipping {} bytes {}", n, direction);
                    self.dir[d].ignore_bytes = n;
                    self.dir[d].data_state = DataState::NetbiosHeader;
                }
            }
            if cur.is_empty() && self.dir[d].seg.is_empty() && self.dir[d].ignore_bytes == 0 {
                break;
            }
        }
    }

    /// Evaluate `window`, the first bytes of the current frame, in the
    /// current data state.
    fn process_window(&mut self, direction: Direction, window: &[u8], buffered: bool,
            host: &mut dyn SmbHost) -> Step
    {
        let d = direction.index();
        match self.dir[d].data_state {
            DataState::NetbiosHeader => {
                let hdr = match parse_nbss_header(window) {
                    Ok((_, hdr)) => hdr,
                    Err(_) => { return Step::Skip(1); }
                };
                self.dir[d].frame_len = hdr.frame_len();
                let raw = self.pdu_state == PduState::RawData(direction);
                let mut events = Vec::new();
                let verdict = nbss_check_header(&hdr, direction, raw, &mut events);
                self.add_nbss_events(events);
                match verdict {
                    NbssVerdict::Success => {
                        self.dir[d].data_state = if raw {
                            DataState::NetbiosPdu
                        } else {
                            DataState::SmbHeader
                        };
                        Step::Next
                    }
                    NbssVerdict::Ignore(n) => Step::Skip(n),
                    NbssVerdict::Error => {
                        self.dir[d].start_junk_scan();
                        Step::Next
                    }
                }
            }
            DataState::SmbHeader => {
                let mut events = Vec::new();
                let verdict = nbss_check_smb_header(window, self.dir[d].frame_len, direction, &mut events);
                self.add_nbss_events(events);
                match verdict {
                    NbssVerdict::Success => {
                        self.dir[d].data_state = DataState::NetbiosPdu;
                        Step::Next
                    }
                    NbssVerdict::Ignore(n) => Step::Skip(n),
                    NbssVerdict::Error => {
                        self.dir[d].start_junk_scan();
                        Step::Next
                    }
                }
            }
            // handled by junk_scan before a window is cut
            DataState::JunkScan => Step::Next,
            DataState::NetbiosPdu => {
                if buffered {
                    self.stats.seg_reassembled += 1;
                    host.reassembled_pdu(direction, RpktType::Seg, window);
                }
                self.process_frame(direction, window, host);
                Step::Done
            }
        }
    }

    fn process_frame(&mut self, direction: Direction, frame: &[u8], host: &mut dyn SmbHost) {
        self.stats.pdus += 1;
        let pdu = &frame[NBSS_HDR_LEN..];
        if self.pdu_state == PduState::RawData(direction) {
            self.pdu_state = PduState::Command;
            smb1_raw_data(self, direction, pdu, host);
            return;
        }
        smb1_inspect(self, direction, pdu, host);
    }
}

impl Drop for SMBState {
    fn drop(&mut self) {
        self.ctx.memcap.free(self.mem_charged);
        self.mem_charged = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_state_need() {
        let mut ds = SMBDirState::new();
        assert_eq!(ds.need(), 4);
        ds.data_state = DataState::SmbHeader;
        assert_eq!(ds.need(), 36);
        ds.frame_len = 20;
        ds.start_junk_scan();
        assert_eq!(ds.need(), 36);
        ds.frame_len = 400;
        assert_eq!(ds.need(), 400);
        ds.data_state = DataState::NetbiosPdu;
        assert_eq!(ds.need(), 400);
    }

    #[test]
    fn test_mem_charge() {
        let mut config = SMBConfig::default();
        config.memcap = 100;
        let ctx = SMBContext::new(config);
        let mut state = SMBState::new(&ctx);
        assert!(state.mem_alloc(60));
        assert!(!state.mem_alloc(60));
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].event, SMBEvent::Memcap);
        state.mem_free(10);
        assert_eq!(state.mem_charged(), 50);
        assert_eq!(ctx.memcap.used(), 50);
        drop(state);
        assert_eq!(ctx.memcap.used(), 0);
    }
}
