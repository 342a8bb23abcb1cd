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

//! Command validation: legal word counts and byte count ranges per
//! command and direction, and the usable size of a command block.

use crate::smb::events::{AlertArg, SMBEvent, SmbAlert};
use crate::smb::policy::Policy;
use crate::smb::smb1::*;
use crate::smb::smb1_records::SmbRecord;

/// Set of byte values, one bit each.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    pub const EMPTY: ByteSet = ByteSet([0; 4]);
    pub const FULL: ByteSet = ByteSet([u64::MAX; 4]);

    pub fn from_slice(values: &[u8]) -> ByteSet {
        let mut s = ByteSet::EMPTY;
        for v in values {
            s.insert(*v);
        }
        s
    }

    pub fn insert(&mut self, v: u8) {
        self.0[(v >> 6) as usize] |= 1 << (v & 63);
    }

    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        for v in lo..=hi {
            self.insert(v);
        }
    }

    pub fn contains(&self, v: u8) -> bool {
        self.0[(v >> 6) as usize] & (1 << (v & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }
}

impl std::fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries((0..=255u8).filter(|v| self.contains(*v))).finish()
    }
}

bitflags! {
    #[derive(Default)]
    pub struct ComInfoFlags: u8 {
        const STATUS_ERROR       = 0x01;
        const INVALID_WORD_COUNT = 0x02;
        const INVALID_BYTE_COUNT = 0x04;
        const BAD_LENGTH         = 0x08;
    }
}

/// Result of validating one command block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ComInfo {
    pub smb_com: u8,
    pub response: bool,
    pub flags: ComInfoFlags,
    pub word_count: u8,
    pub byte_count: u16,
    /// Word count byte, parameter words and byte count field.
    pub cmd_size: u16,
}

impl ComInfo {
    /// Command fields can be read. An invalid byte count alone does not
    /// prevent processing.
    pub fn can_process(&self) -> bool {
        !self.flags.intersects(ComInfoFlags::BAD_LENGTH |
                ComInfoFlags::STATUS_ERROR |
                ComInfoFlags::INVALID_WORD_COUNT)
    }

    pub fn is_status_error(&self) -> bool {
        self.flags.contains(ComInfoFlags::STATUS_ERROR)
    }

    pub fn is_request(&self) -> bool {
        !self.response
    }

    pub fn is_response(&self) -> bool {
        self.response
    }
}

const REQ: usize = 0;
const RESP: usize = 1;

/// Legal counts of one command, per direction.
pub struct SmbComCounts {
    pub com: u8,
    pub req_wct: &'static [u8],
    pub resp_wct: &'static [u8],
    /// Inclusive byte count ranges.
    pub req_bcc: (u16, u16),
    pub resp_bcc: (u16, u16),
}

const MAX: u16 = u16::MAX;

/// Counts of every command with a handler. NtTransact word counts are
/// ranges and are added separately.
pub static SMB1_COM_COUNTS: &[SmbComCounts] = &[
    SmbComCounts { com: SMB1_COMMAND_OPEN, req_wct: &[2], resp_wct: &[7], req_bcc: (2, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_CREATE, req_wct: &[3], resp_wct: &[1], req_bcc: (2, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_CLOSE, req_wct: &[3], resp_wct: &[0], req_bcc: (0, 0), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_RENAME, req_wct: &[1], resp_wct: &[0], req_bcc: (4, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_READ, req_wct: &[5], resp_wct: &[5], req_bcc: (0, 0), resp_bcc: (3, MAX) },
    SmbComCounts { com: SMB1_COMMAND_WRITE, req_wct: &[5], resp_wct: &[1], req_bcc: (3, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_CREATE_NEW, req_wct: &[3], resp_wct: &[1], req_bcc: (2, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_LOCK_AND_READ, req_wct: &[5], resp_wct: &[5], req_bcc: (0, 0), resp_bcc: (3, MAX) },
    SmbComCounts { com: SMB1_COMMAND_WRITE_AND_UNLOCK, req_wct: &[5], resp_wct: &[1], req_bcc: (3, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_READ_RAW, req_wct: &[8, 10], resp_wct: &[], req_bcc: (0, 0), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_WRITE_RAW, req_wct: &[12, 14], resp_wct: &[1], req_bcc: (0, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_WRITE_COMPLETE, req_wct: &[], resp_wct: &[1], req_bcc: (0, 0), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_TRANS, req_wct: &[14, 16], resp_wct: &[0, 10], req_bcc: (0, MAX), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_TRANS_SECONDARY, req_wct: &[8], resp_wct: &[], req_bcc: (0, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_WRITE_AND_CLOSE, req_wct: &[6, 12], resp_wct: &[1], req_bcc: (1, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_OPEN_ANDX, req_wct: &[15], resp_wct: &[15, 19], req_bcc: (2, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_READ_ANDX, req_wct: &[10, 12], resp_wct: &[12], req_bcc: (0, 0), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_WRITE_ANDX, req_wct: &[12, 14], resp_wct: &[6], req_bcc: (0, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_TRANS2, req_wct: &[15], resp_wct: &[0, 10, 11], req_bcc: (0, MAX), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_TRANS2_SECONDARY, req_wct: &[9], resp_wct: &[], req_bcc: (0, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_TREE_CONNECT, req_wct: &[0], resp_wct: &[2], req_bcc: (4, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_TREE_DISCONNECT, req_wct: &[0], resp_wct: &[0], req_bcc: (0, 0), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_NEGOTIATE_PROTOCOL, req_wct: &[0], resp_wct: &[1, 13, 17], req_bcc: (2, MAX), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_SESSION_SETUP_ANDX, req_wct: &[10, 12, 13], resp_wct: &[3, 4], req_bcc: (0, MAX), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_LOGOFF_ANDX, req_wct: &[2], resp_wct: &[2, 3], req_bcc: (0, 0), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_TREE_CONNECT_ANDX, req_wct: &[4], resp_wct: &[2, 3, 7], req_bcc: (3, MAX), resp_bcc: (2, MAX) },
    SmbComCounts { com: SMB1_COMMAND_NT_TRANS, req_wct: &[], resp_wct: &[0], req_bcc: (0, MAX), resp_bcc: (0, MAX) },
    SmbComCounts { com: SMB1_COMMAND_NT_TRANS_SECONDARY, req_wct: &[18], resp_wct: &[], req_bcc: (0, MAX), resp_bcc: (0, 0) },
    SmbComCounts { com: SMB1_COMMAND_NT_CREATE_ANDX, req_wct: &[24], resp_wct: &[26, 34, 42], req_bcc: (2, MAX), resp_bcc: (0, 0) },
];

/// Word count and byte count tables, built once per context.
pub struct CommandTable {
    wct: Box<[[ByteSet; 2]; 256]>,
    bcc: Box<[[(u16, u16); 2]; 256]>,
}

impl CommandTable {
    pub fn new() -> CommandTable {
        let mut t = CommandTable {
            wct: Box::new([[ByteSet::FULL; 2]; 256]),
            bcc: Box::new([[(0, MAX); 2]; 256]),
        };
        for c in SMB1_COM_COUNTS {
            let com = c.com as usize;
            t.wct[com] = [ByteSet::from_slice(c.req_wct), ByteSet::from_slice(c.resp_wct)];
            t.bcc[com] = [c.req_bcc, c.resp_bcc];
        }
        // wct is 19 + setup count, or 18 + setup count in responses
        t.wct[SMB1_COMMAND_NT_TRANS as usize][REQ].insert_range(19, 255);
        t.wct[SMB1_COMMAND_NT_TRANS as usize][RESP].insert_range(18, 255);
        t
    }

    pub fn is_valid_word_count(&self, com: u8, response: bool, wct: u8) -> bool {
        self.wct[com as usize][response as usize].contains(wct)
    }

    pub fn byte_count_range(&self, com: u8, response: bool) -> (u16, u16) {
        self.bcc[com as usize][response as usize]
    }

    pub fn is_valid_byte_count(&self, com: u8, response: bool, bcc: u16) -> bool {
        let (min, max) = self.byte_count_range(com, response);
        bcc >= min && bcc <= max
    }

    /// Validate the command block `com`, starting at the word count,
    /// of a command in the PDU described by `hdr`. Anomalies are
    /// returned as flags and pushed to `events`.
    pub fn check_command(&self, policy: Policy, hdr: &SmbRecord, smb_com: u8, com: &[u8],
            events: &mut Vec<SmbAlert>) -> ComInfo
    {
        let response = hdr.is_response();
        let mut info = ComInfo {
            smb_com,
            response,
            ..Default::default()
        };
        let alert = |events: &mut Vec<SmbAlert>, event: SMBEvent, args: Vec<AlertArg>| {
            events.push(SmbAlert { event, args });
        };

        if com.is_empty() {
            info.flags |= ComInfoFlags::BAD_LENGTH;
            alert(events, SMBEvent::NbLtCom, vec![AlertArg::Int(1), AlertArg::Int(0)]);
            return info;
        }
        let wct = com[0];
        info.word_count = wct;

        if response && hdr.is_status_error() {
            info.flags |= ComInfoFlags::STATUS_ERROR;
            if wct == 0 {
                info.cmd_size = 3;
                if com.len() < 3 {
                    info.flags |= ComInfoFlags::BAD_LENGTH;
                    alert(events, SMBEvent::NbLtCom, vec![AlertArg::Int(3), AlertArg::Int(com.len() as u64)]);
                    return info;
                }
                info.byte_count = u16::from_le_bytes([com[1], com[2]]);
                // the usual way of rejecting a request
                if info.byte_count == 0 {
                    return info;
                }
            }
        }

        if !self.is_valid_word_count(smb_com, response, wct) {
            info.flags |= ComInfoFlags::INVALID_WORD_COUNT;
            alert(events, SMBEvent::BadWordCount, vec![AlertArg::Int(smb_com as u64), AlertArg::Int(wct as u64)]);
            return info;
        }

        let cmd_size = 1 + 2 * wct as usize + 2;
        info.cmd_size = cmd_size as u16;
        if com.len() < cmd_size {
            info.flags |= ComInfoFlags::BAD_LENGTH;
            alert(events, SMBEvent::NbLtCom, vec![AlertArg::Int(cmd_size as u64), AlertArg::Int(com.len() as u64)]);
            return info;
        }

        let mut bcc = u16::from_le_bytes([com[cmd_size - 2], com[cmd_size - 1]]);
        // Windows counts the extended response words in the byte count
        if smb_com == SMB1_COMMAND_NT_CREATE_ANDX && response && wct == 42 {
            bcc = 0;
        }
        info.byte_count = bcc;

        let trans_interim = response && wct == 0 && smb1_is_trans_command(smb_com);
        if !trans_interim && !self.is_valid_byte_count(smb_com, response, bcc) {
            info.flags |= ComInfoFlags::INVALID_BYTE_COUNT;
            alert(events, SMBEvent::BadByteCount, vec![AlertArg::Int(smb_com as u64), AlertArg::Int(bcc as u64)]);
        }

        let avail = com.len() - cmd_size;
        let (min_bcc, _) = self.byte_count_range(smb_com, response);
        if !trans_interim && avail < min_bcc as usize {
            info.flags |= ComInfoFlags::BAD_LENGTH;
            alert(events, SMBEvent::NbLtBcc, vec![AlertArg::Int(min_bcc as u64), AlertArg::Int(avail as u64)]);
            return info;
        }
        if bcc as usize > avail && !policy.traits().bcc_over_remaining_silent {
            alert(events, SMBEvent::NbLtBcc, vec![AlertArg::Int(bcc as u64), AlertArg::Int(avail as u64)]);
        }

        if smb_com == SMB1_COMMAND_TRANS && !response && bcc == 0 &&
            policy.traits().zero_bcc_trans_is_bad_length
        {
            info.flags |= ComInfoFlags::BAD_LENGTH;
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::smb1_records::parse_smb_record;
    use test_case::test_case;

    fn header(response: bool, flags2: u16, status: u32) -> Vec<u8> {
        let mut h = b"\xffSMB\x2f".to_vec();
        h.extend_from_slice(&status.to_le_bytes());
        h.push(if response { 0x80 } else { 0 });
        h.extend_from_slice(&flags2.to_le_bytes());
        h.resize(32, 0);
        h
    }

    #[test]
    fn test_byteset() {
        let mut s = ByteSet::from_slice(&[0, 63, 64, 255]);
        assert!(s.contains(0) && s.contains(63) && s.contains(64) && s.contains(255));
        assert!(!s.contains(1) && !s.contains(128));
        s.insert_range(100, 102);
        assert!(s.contains(101));
        assert!(ByteSet::EMPTY.is_empty());
        assert!(!s.is_empty());
    }

    /// Every word count put in the table is reported valid, and nothing
    /// else is.
    #[test]
    fn test_word_count_table() {
        let t = CommandTable::new();
        for c in SMB1_COM_COUNTS {
            for (response, list) in [(false, c.req_wct), (true, c.resp_wct)] {
                for wct in 0..=255u8 {
                    let listed = list.contains(&wct);
                    let nt_range = c.com == SMB1_COMMAND_NT_TRANS &&
                        ((!response && wct >= 19) || (response && wct >= 18));
                    assert_eq!(t.is_valid_word_count(c.com, response, wct), listed || nt_range,
                            "com {:02x} response {} wct {}", c.com, response, wct);
                }
            }
        }
        // commands without handlers accept anything
        for wct in 0..=255u8 {
            assert!(t.is_valid_word_count(SMB1_COMMAND_ECHO, false, wct));
            assert!(t.is_valid_word_count(SMB1_COMMAND_ECHO, true, wct));
        }
    }

    #[test_case(false, 0, 0, &[7], &[], ComInfoFlags::INVALID_WORD_COUNT, Some(SMBEvent::BadWordCount) ; "bad wct")]
    #[test_case(false, 0, 0, &[14, 0, 0], &[], ComInfoFlags::BAD_LENGTH, Some(SMBEvent::NbLtCom) ; "short block")]
    #[test_case(true, 0x4000, 0xc0000022, &[0, 0, 0], &[], ComInfoFlags::STATUS_ERROR, None ; "rejected request")]
    #[test_case(true, 0, 0, &[6], &[0xff, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], ComInfoFlags::empty(), None ; "write andx response")]
    #[test_case(true, 0, 0, &[6], &[0xff, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x41, 0x41], ComInfoFlags::INVALID_BYTE_COUNT, Some(SMBEvent::BadByteCount) ; "unexpected bytes")]
    fn test_check_command(response: bool, flags2: u16, status: u32, wct: &[u8], rest: &[u8],
            flags: ComInfoFlags, event: Option<SMBEvent>)
    {
        let t = CommandTable::new();
        let h = header(response, flags2, status);
        let (_, r) = parse_smb_record(&h).unwrap();
        let mut com = wct.to_vec();
        com.extend_from_slice(rest);
        let mut events = Vec::new();
        let info = t.check_command(Policy::WinXP, &r, SMB1_COMMAND_WRITE_ANDX, &com, &mut events);
        assert_eq!(info.flags, flags);
        assert_eq!(events.first().map(|a| a.event), event);
    }

    fn write_andx_request(bcc: u16, present: usize) -> Vec<u8> {
        let mut com = vec![12u8];
        com.extend_from_slice(&[0u8; 24]);
        com.extend_from_slice(&bcc.to_le_bytes());
        com.extend(std::iter::repeat(0x41).take(present));
        com
    }

    #[test_case(Policy::WinXP, true ; "windows alerts")]
    #[test_case(Policy::Samba, true ; "samba alerts")]
    #[test_case(Policy::Samba3_0_22, false ; "samba 3.0.22 silent")]
    #[test_case(Policy::Samba3_0_20, false ; "samba 3.0.20 silent")]
    fn test_bcc_over_remaining(policy: Policy, alert: bool) {
        let t = CommandTable::new();
        let h = header(false, 0, 0);
        let (_, r) = parse_smb_record(&h).unwrap();
        let com = write_andx_request(100, 10);
        let mut events = Vec::new();
        let info = t.check_command(policy, &r, SMB1_COMMAND_WRITE_ANDX, &com, &mut events);
        assert!(info.can_process());
        assert_eq!(info.byte_count, 100);
        assert_eq!(info.cmd_size, 27);
        assert_eq!(events.iter().any(|a| a.event == SMBEvent::NbLtBcc), alert);
    }

    #[test]
    fn test_nt_create_andx_wct42() {
        let t = CommandTable::new();
        let h = header(true, 0, 0);
        let (_, r) = parse_smb_record(&h).unwrap();
        let mut com = vec![42u8];
        com.extend_from_slice(&[0u8; 84]);
        com.extend_from_slice(&[0x20, 0x00]);
        let mut events = Vec::new();
        let info = t.check_command(Policy::WinXP, &r, SMB1_COMMAND_NT_CREATE_ANDX, &com, &mut events);
        assert_eq!(info.byte_count, 0);
        assert!(info.flags.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_trans_interim_response() {
        let t = CommandTable::new();
        let h = header(true, 0, 0);
        let (_, r) = parse_smb_record(&h).unwrap();
        let mut events = Vec::new();
        let info = t.check_command(Policy::WinXP, &r, SMB1_COMMAND_TRANS, &[0, 0, 0], &mut events);
        assert!(info.can_process());
        assert!(events.is_empty());
    }

    #[test]
    fn test_samba_zero_bcc_trans() {
        let t = CommandTable::new();
        let h = header(false, 0, 0);
        let (_, r) = parse_smb_record(&h).unwrap();
        let mut com = vec![16u8];
        com.extend_from_slice(&[0u8; 34]);
        let mut events = Vec::new();
        let info = t.check_command(Policy::Samba, &r, SMB1_COMMAND_TRANS, &com, &mut events);
        assert!(!info.can_process());
        let info = t.check_command(Policy::WinXP, &r, SMB1_COMMAND_TRANS, &com, &mut events);
        assert!(info.can_process());
    }
}
