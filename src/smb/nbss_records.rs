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

//! NetBIOS Session Service framing and the frame validator.

use memchr::memmem;
use nom7::number::streaming::{be_u16, be_u8};
use nom7::IResult;

use crate::direction::Direction;
use crate::smb::events::SMBEvent;
use crate::smb::smb1_records::SMB1_HEADER_SIZE;

pub const NBSS_HDR_LEN: usize = 4;

pub const NBSS_MSGTYPE_SESSION_MESSAGE:         u8 = 0x00;
pub const NBSS_MSGTYPE_SESSION_REQUEST:         u8 = 0x81;
pub const NBSS_MSGTYPE_POSITIVE_SSN_RESPONSE:   u8 = 0x82;
pub const NBSS_MSGTYPE_NEGATIVE_SSN_RESPONSE:   u8 = 0x83;
pub const NBSS_MSGTYPE_RETARG_RESPONSE:         u8 = 0x84;
pub const NBSS_MSGTYPE_KEEP_ALIVE:              u8 = 0x85;

pub const SMB1_MARKER: &[u8; 4] = b"\xffSMB";

/// Bytes looked at when deciding what a frame is: the NetBIOS header
/// plus an SMB1 header.
pub const NBSS_SMB_WINDOW: usize = NBSS_HDR_LEN + SMB1_HEADER_SIZE;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NbssHeader {
    pub message_type: u8,
    pub length: u32,
}

impl NbssHeader {
    pub fn is_valid(&self) -> bool {
        let valid = match self.message_type {
            NBSS_MSGTYPE_SESSION_MESSAGE |
            NBSS_MSGTYPE_SESSION_REQUEST |
            NBSS_MSGTYPE_POSITIVE_SSN_RESPONSE |
            NBSS_MSGTYPE_NEGATIVE_SSN_RESPONSE |
            NBSS_MSGTYPE_RETARG_RESPONSE |
            NBSS_MSGTYPE_KEEP_ALIVE => true,
            _ => false,
        };
        valid
    }

    /// Length of the whole frame, header included.
    pub fn frame_len(&self) -> u32 {
        self.length + NBSS_HDR_LEN as u32
    }
}

/// Parse the 4 byte header. The length is 17 bits: the low bit of the
/// flags byte extends the 16 bit length.
pub fn parse_nbss_header(i: &[u8]) -> IResult<&[u8], NbssHeader> {
    let (i, message_type) = be_u8(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, len) = be_u16(i)?;
    let hdr = NbssHeader {
        message_type,
        length: ((flags & 0x01) as u32) << 16 | len as u32,
    };
    Ok((i, hdr))
}

/// Outcome of looking at the start of a frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NbssVerdict {
    /// Frame can be processed.
    Success,
    /// Skip this many bytes, counted from the frame start, then retry.
    Ignore(u32),
    /// Malformed frame start. The skip count comes from a marker scan
    /// over the advertised frame.
    Error,
}

/// Check a NetBIOS header seen in `direction`. `raw_mode` is set when
/// the frame carries raw read/write data instead of an SMB PDU.
pub fn nbss_check_header(hdr: &NbssHeader, direction: Direction, raw_mode: bool,
        events: &mut Vec<SMBEvent>) -> NbssVerdict
{
    match hdr.message_type {
        NBSS_MSGTYPE_SESSION_MESSAGE => {
            if raw_mode {
                return NbssVerdict::Success;
            }
            if hdr.length == 0 {
                return NbssVerdict::Ignore(NBSS_HDR_LEN as u32);
            }
            if (hdr.length as usize) < SMB1_HEADER_SIZE {
                events.push(SMBEvent::NbLtSmbHdr);
                return NbssVerdict::Ignore(hdr.frame_len());
            }
            NbssVerdict::Success
        }
        NBSS_MSGTYPE_SESSION_REQUEST => {
            if direction == Direction::ToClient {
                events.push(SMBEvent::BadNbssType);
            }
            NbssVerdict::Ignore(hdr.frame_len())
        }
        NBSS_MSGTYPE_POSITIVE_SSN_RESPONSE |
        NBSS_MSGTYPE_NEGATIVE_SSN_RESPONSE |
        NBSS_MSGTYPE_RETARG_RESPONSE => {
            if direction == Direction::ToServer {
                events.push(SMBEvent::BadNbssType);
            }
            NbssVerdict::Ignore(hdr.frame_len())
        }
        NBSS_MSGTYPE_KEEP_ALIVE => NbssVerdict::Ignore(hdr.frame_len()),
        _ => {
            events.push(SMBEvent::BadNbssType);
            NbssVerdict::Error
        }
    }
}

/// Check the SMB header of a session message. `window` holds the NBSS
/// header followed by the SMB header.
pub fn nbss_check_smb_header(window: &[u8], frame_len: u32, direction: Direction,
        events: &mut Vec<SMBEvent>) -> NbssVerdict
{
    if window.len() < NBSS_SMB_WINDOW {
        return NbssVerdict::Ignore(frame_len);
    }
    let smb = &window[NBSS_HDR_LEN..];
    if &smb[..4] == SMB1_MARKER {
        // flags byte, response bit
        let response = smb[9] & 0x80 != 0;
        if response != direction.is_to_client() {
            events.push(SMBEvent::BadSmbType);
        }
        return NbssVerdict::Success;
    }
    if &smb[1..4] == b"SMB" && (smb[0] == 0xfe || smb[0] == 0xfd) {
        SCLogDebug!("SMB2/3 frame, skipping {} bytes", frame_len);
        return NbssVerdict::Ignore(frame_len);
    }
    events.push(SMBEvent::BadSmbId);
    NbssVerdict::Error
}

/// Bytes carried between deliveries while scanning: enough for a marker
/// split across them plus the NetBIOS header in front of it.
pub const JUNK_SCAN_KEEP: usize = NBSS_HDR_LEN + SMB1_MARKER.len() - 1;

/// Bytes of a suspect frame searched for a marker. Short frames are
/// searched over a full header window.
pub fn nbss_junk_region(frame_len: u32) -> usize {
    std::cmp::max(frame_len as usize, NBSS_SMB_WINDOW)
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JunkScan {
    /// Skip this many bytes from the start of the scanned data.
    Skip(u32),
    /// No decision yet. Drop this many bytes from the front and keep the
    /// rest for the next delivery.
    More(usize),
}

/// Scan a frame whose start is suspect for the SMB1 marker.
///
/// `data` holds the frame's bytes from offset `off` on. A marker counts
/// from frame offset 5, past the place it should have had. When found,
/// the skip leaves the stream on the NetBIOS header in front of it.
/// Once the whole region was seen without a marker, the advertised frame
/// length is skipped.
pub fn nbss_junk_scan(data: &[u8], off: usize, frame_len: u32) -> JunkScan {
    let region = nbss_junk_region(frame_len);
    let data = &data[..std::cmp::min(data.len(), region.saturating_sub(off))];
    let start = (NBSS_HDR_LEN + 1).saturating_sub(off);
    if data.len() > start {
        if let Some(pos) = memmem::find(&data[start..], SMB1_MARKER) {
            return JunkScan::Skip((start + pos - NBSS_HDR_LEN) as u32);
        }
    }
    let frame_left = (frame_len as usize).saturating_sub(off);
    if off + data.len() >= region {
        return JunkScan::Skip(frame_left as u32);
    }
    JunkScan::More(std::cmp::min(data.len().saturating_sub(JUNK_SCAN_KEEP), frame_left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_nbss_header() {
        let buf = [0x00, 0x01, 0x00, 0x10, 0xff];
        let (rem, hdr) = parse_nbss_header(&buf).unwrap();
        assert_eq!(rem, &[0xff]);
        assert_eq!(hdr.message_type, NBSS_MSGTYPE_SESSION_MESSAGE);
        assert_eq!(hdr.length, 0x10010);
        assert_eq!(hdr.frame_len(), 0x10014);
        assert!(hdr.is_valid());
        assert!(parse_nbss_header(&buf[..3]).is_err());
    }

    #[test_case(NBSS_MSGTYPE_SESSION_MESSAGE, 100, Direction::ToServer, NbssVerdict::Success, None ; "session message")]
    #[test_case(NBSS_MSGTYPE_SESSION_MESSAGE, 0, Direction::ToServer, NbssVerdict::Ignore(4), None ; "empty session message")]
    #[test_case(NBSS_MSGTYPE_SESSION_MESSAGE, 20, Direction::ToServer, NbssVerdict::Ignore(24), Some(SMBEvent::NbLtSmbHdr) ; "shorter than smb header")]
    #[test_case(NBSS_MSGTYPE_SESSION_REQUEST, 68, Direction::ToServer, NbssVerdict::Ignore(72), None ; "session request to server")]
    #[test_case(NBSS_MSGTYPE_SESSION_REQUEST, 68, Direction::ToClient, NbssVerdict::Ignore(72), Some(SMBEvent::BadNbssType) ; "session request to client")]
    #[test_case(NBSS_MSGTYPE_POSITIVE_SSN_RESPONSE, 0, Direction::ToServer, NbssVerdict::Ignore(4), Some(SMBEvent::BadNbssType) ; "positive response to server")]
    #[test_case(NBSS_MSGTYPE_KEEP_ALIVE, 0, Direction::ToClient, NbssVerdict::Ignore(4), None ; "keep alive")]
    #[test_case(0x42, 10, Direction::ToServer, NbssVerdict::Error, Some(SMBEvent::BadNbssType) ; "unknown type")]
    fn test_nbss_check_header(message_type: u8, length: u32, direction: Direction,
            verdict: NbssVerdict, event: Option<SMBEvent>)
    {
        let mut events = Vec::new();
        let hdr = NbssHeader { message_type, length };
        assert_eq!(nbss_check_header(&hdr, direction, false, &mut events), verdict);
        assert_eq!(events.first().copied(), event);
    }

    #[test]
    fn test_nbss_check_header_raw() {
        let mut events = Vec::new();
        let hdr = NbssHeader { message_type: NBSS_MSGTYPE_SESSION_MESSAGE, length: 8 };
        assert_eq!(nbss_check_header(&hdr, Direction::ToServer, true, &mut events), NbssVerdict::Success);
        assert!(events.is_empty());
    }

    fn window(marker: &[u8], flags: u8) -> Vec<u8> {
        let mut w = vec![0x00, 0x00, 0x00, 0x40];
        w.extend_from_slice(marker);
        w.push(0x72);
        w.extend_from_slice(&[0, 0, 0, 0]);
        w.push(flags);
        w.resize(NBSS_SMB_WINDOW, 0);
        w
    }

    #[test]
    fn test_nbss_check_smb_header() {
        let mut events = Vec::new();
        let w = window(b"\xffSMB", 0x00);
        assert_eq!(nbss_check_smb_header(&w, 0x44, Direction::ToServer, &mut events), NbssVerdict::Success);
        assert!(events.is_empty());

        let w = window(b"\xffSMB", 0x80);
        assert_eq!(nbss_check_smb_header(&w, 0x44, Direction::ToServer, &mut events), NbssVerdict::Success);
        assert_eq!(events, vec![SMBEvent::BadSmbType]);

        events.clear();
        let w = window(b"\xfeSMB", 0x00);
        assert_eq!(nbss_check_smb_header(&w, 0x44, Direction::ToServer, &mut events), NbssVerdict::Ignore(0x44));
        assert!(events.is_empty());

        let w = window(b"JUNK", 0x00);
        assert_eq!(nbss_check_smb_header(&w, 0x44, Direction::ToServer, &mut events), NbssVerdict::Error);
        assert_eq!(events, vec![SMBEvent::BadSmbId]);
    }

    #[test]
    fn test_nbss_junk_scan() {
        // three junk bytes in front of a frame
        let mut w = vec![0x41, 0x41, 0x41, 0x00, 0x00, 0x00, 0x40];
        w.extend_from_slice(b"\xffSMB");
        w.resize(NBSS_SMB_WINDOW, 0);
        assert_eq!(nbss_junk_scan(&w, 0, 1000), JunkScan::Skip(3));

        // marker at its normal place does not count
        let w = window(b"\xffSMB", 0);
        assert_eq!(nbss_junk_scan(&w, 0, 1000), JunkScan::More(NBSS_SMB_WINDOW - JUNK_SCAN_KEEP));

        // marker past the header window
        let mut w = vec![0x41; 60];
        w.extend_from_slice(&[0x00, 0x00, 0x00, 0x40]);
        w.extend_from_slice(b"\xffSMB");
        assert_eq!(nbss_junk_scan(&w, 0, 0x4145), JunkScan::Skip(60));
        // same marker seen after earlier bytes were dropped
        assert_eq!(nbss_junk_scan(&w[50..], 50, 0x4145), JunkScan::Skip(10));
    }

    #[test]
    fn test_nbss_junk_scan_no_marker() {
        assert_eq!(nbss_junk_scan(&[0x41; 40], 0, 12), JunkScan::Skip(12));
        assert_eq!(nbss_junk_scan(&[0x41; 8], 0, 12), JunkScan::More(1));
        assert_eq!(nbss_junk_scan(&[0x41; 8], 0, 4), JunkScan::More(1));
        assert_eq!(nbss_junk_scan(&[0x41; 10], 90, 100), JunkScan::Skip(10));
        // bytes past the region are not looked at
        let mut w = vec![0x41; 40];
        w.extend_from_slice(b"\xffSMB");
        assert_eq!(nbss_junk_scan(&w, 0, 20), JunkScan::Skip(20));
    }
}
