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

//! Seam to the DCE/RPC interpreter that consumes named pipe payloads.

use std::any::Any;
use std::fmt;

use crate::direction::Direction;
use crate::smb::nbss_records::NBSS_MSGTYPE_SESSION_MESSAGE;
use crate::smb::session::PipeId;
use crate::smb::smb::*;
use crate::smb::smb1_records::SMB1_HEADER_SIZE;

/// How a PDU handed to `reassembled_pdu` came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpktType {
    /// NetBIOS frame rebuilt from several deliveries.
    Seg,
    /// Transaction payload rebuilt from several fragments, wrapped in a
    /// mock SMB PDU.
    Trans,
}

/// Connection oriented DCE/RPC state of one named pipe. The state is
/// owned by the interpreter, the counters by the SMB layer.
#[derive(Default)]
pub struct CoTracker {
    pub state: Option<Box<dyn Any + Send>>,
    pub bytes_ts: u64,
    pub bytes_tc: u64,
}

impl fmt::Debug for CoTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoTracker")
            .field("state", &self.state.is_some())
            .field("bytes_ts", &self.bytes_ts)
            .field("bytes_tc", &self.bytes_tc)
            .finish()
    }
}

pub trait DceRpcHandler {
    /// Named pipe payload, in order, for one direction of one pipe.
    fn co_process(&mut self, co: &mut CoTracker, direction: Direction, data: &[u8]);

    /// A PDU that does not exist as such on the wire.
    fn reassembled_pdu(&mut self, _direction: Direction, _kind: RpktType, _pdu: &[u8]) {}
}

/// Wrap `payload` in a NetBIOS frame and a copy of `smb_hdr`, with no
/// parameter words, so it looks like a single SMB PDU.
pub fn smb1_mock_pdu(smb_hdr: &[u8], payload: &[u8]) -> Vec<u8> {
    let hdr = &smb_hdr[..std::cmp::min(SMB1_HEADER_SIZE, smb_hdr.len())];
    let bcc = std::cmp::min(payload.len(), u16::MAX as usize);
    let payload = &payload[..bcc];
    let nb_len = hdr.len() + 3 + payload.len();
    let mut pdu = Vec::with_capacity(4 + nb_len);
    pdu.push(NBSS_MSGTYPE_SESSION_MESSAGE);
    pdu.push(((nb_len >> 16) & 0x01) as u8);
    pdu.extend_from_slice(&(nb_len as u16).to_be_bytes());
    pdu.extend_from_slice(hdr);
    pdu.push(0); // wct
    pdu.extend_from_slice(&(bcc as u16).to_le_bytes());
    pdu.extend_from_slice(payload);
    pdu
}

impl SMBState {
    /// Forward named pipe payload to the interpreter.
    pub fn pipe_forward(&mut self, pipe: PipeId, direction: Direction, data: &[u8],
            host: &mut dyn SmbHost)
    {
        if data.is_empty() {
            return;
        }
        let pipe = match self.pipes.get_mut(pipe) {
            Some(p) => p,
            None => { return; }
        };
        SCLogDebug!("forwarding {} bytes {} on fid {:?}", data.len(), direction, pipe.fid);
        if direction.is_to_server() {
            pipe.co_tracker.bytes_ts += data.len() as u64;
            self.stats.bytes_forwarded_ts += data.len() as u64;
        } else {
            pipe.co_tracker.bytes_tc += data.len() as u64;
            self.stats.bytes_forwarded_tc += data.len() as u64;
        }
        host.co_process(&mut pipe.co_tracker, direction, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::nbss_records::parse_nbss_header;

    #[test]
    fn test_smb1_mock_pdu() {
        let mut hdr = b"\xffSMB\x25".to_vec();
        hdr.resize(SMB1_HEADER_SIZE, 0);
        let pdu = smb1_mock_pdu(&hdr, b"\x05\x00\x0b\x03");
        let (rem, nb) = parse_nbss_header(&pdu).unwrap();
        assert_eq!(nb.length as usize, rem.len());
        assert_eq!(&rem[..5], b"\xffSMB\x25");
        assert_eq!(&rem[32..35], &[0, 4, 0]);
        assert_eq!(&rem[35..], b"\x05\x00\x0b\x03");
    }
}
