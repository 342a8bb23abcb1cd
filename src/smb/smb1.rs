/* Copyright (C) 2018-2024 Open Information Security Foundation
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

//! SMB1 command layer: the inspection gate, the AndX chain walk and the
//! file and named pipe command handlers.

use crate::direction::Direction;

use crate::smb::events::*;
use crate::smb::policy::AndXClass;
use crate::smb::session::*;
use crate::smb::smb::*;
use crate::smb::smb1_records::*;
use crate::smb::smb1_session::*;
use crate::smb::smb1_trans::*;
use crate::smb::validate::{ByteSet, ComInfo};

// https://msdn.microsoft.com/en-us/library/ee441741.aspx
pub const SMB1_COMMAND_CREATE_DIRECTORY:        u8 = 0x00;
pub const SMB1_COMMAND_DELETE_DIRECTORY:        u8 = 0x01;
pub const SMB1_COMMAND_OPEN:                    u8 = 0x02;
pub const SMB1_COMMAND_CREATE:                  u8 = 0x03;
pub const SMB1_COMMAND_CLOSE:                   u8 = 0x04;
pub const SMB1_COMMAND_FLUSH:                   u8 = 0x05;
pub const SMB1_COMMAND_DELETE:                  u8 = 0x06;
pub const SMB1_COMMAND_RENAME:                  u8 = 0x07;
pub const SMB1_COMMAND_QUERY_INFORMATION:       u8 = 0x08;
pub const SMB1_COMMAND_SET_INFORMATION:         u8 = 0x09;
pub const SMB1_COMMAND_READ:                    u8 = 0x0a;
pub const SMB1_COMMAND_WRITE:                   u8 = 0x0b;
pub const SMB1_COMMAND_LOCK_BYTE_RANGE:         u8 = 0x0c;
pub const SMB1_COMMAND_UNLOCK_BYTE_RANGE:       u8 = 0x0d;
pub const SMB1_COMMAND_CREATE_TEMPORARY:        u8 = 0x0e;
pub const SMB1_COMMAND_CREATE_NEW:              u8 = 0x0f;
pub const SMB1_COMMAND_CHECK_DIRECTORY:         u8 = 0x10;
pub const SMB1_COMMAND_PROCESS_EXIT:            u8 = 0x11;
pub const SMB1_COMMAND_SEEK:                    u8 = 0x12;
pub const SMB1_COMMAND_LOCK_AND_READ:           u8 = 0x13;
pub const SMB1_COMMAND_WRITE_AND_UNLOCK:        u8 = 0x14;
pub const SMB1_COMMAND_READ_RAW:                u8 = 0x1a;
pub const SMB1_COMMAND_WRITE_RAW:               u8 = 0x1d;
pub const SMB1_COMMAND_WRITE_COMPLETE:          u8 = 0x20;
pub const SMB1_COMMAND_LOCKING_ANDX:            u8 = 0x24;
pub const SMB1_COMMAND_TRANS:                   u8 = 0x25;
pub const SMB1_COMMAND_TRANS_SECONDARY:         u8 = 0x26;
pub const SMB1_COMMAND_IOCTL:                   u8 = 0x27;
pub const SMB1_COMMAND_ECHO:                    u8 = 0x2b;
pub const SMB1_COMMAND_WRITE_AND_CLOSE:         u8 = 0x2c;
pub const SMB1_COMMAND_OPEN_ANDX:               u8 = 0x2d;
pub const SMB1_COMMAND_READ_ANDX:               u8 = 0x2e;
pub const SMB1_COMMAND_WRITE_ANDX:              u8 = 0x2f;
pub const SMB1_COMMAND_TRANS2:                  u8 = 0x32;
pub const SMB1_COMMAND_TRANS2_SECONDARY:        u8 = 0x33;
pub const SMB1_COMMAND_FIND_CLOSE2:             u8 = 0x34;
pub const SMB1_COMMAND_TREE_CONNECT:            u8 = 0x70;
pub const SMB1_COMMAND_TREE_DISCONNECT:         u8 = 0x71;
pub const SMB1_COMMAND_NEGOTIATE_PROTOCOL:      u8 = 0x72;
pub const SMB1_COMMAND_SESSION_SETUP_ANDX:      u8 = 0x73;
pub const SMB1_COMMAND_LOGOFF_ANDX:             u8 = 0x74;
pub const SMB1_COMMAND_TREE_CONNECT_ANDX:       u8 = 0x75;
pub const SMB1_COMMAND_QUERY_INFO_DISK:         u8 = 0x80;
pub const SMB1_COMMAND_NT_TRANS:                u8 = 0xa0;
pub const SMB1_COMMAND_NT_TRANS_SECONDARY:      u8 = 0xa1;
pub const SMB1_COMMAND_NT_CREATE_ANDX:          u8 = 0xa2;
pub const SMB1_COMMAND_NT_CANCEL:               u8 = 0xa4;
pub const SMB1_COMMAND_OPEN_PRINT_FILE:         u8 = 0xc0;
pub const SMB1_COMMAND_NONE:                    u8 = 0xff;

pub fn smb1_command_string(c: u8) -> String {
    match c {
        SMB1_COMMAND_CREATE_DIRECTORY   => "SMB1_COMMAND_CREATE_DIRECTORY",
        SMB1_COMMAND_DELETE_DIRECTORY   => "SMB1_COMMAND_DELETE_DIRECTORY",
        SMB1_COMMAND_OPEN               => "SMB1_COMMAND_OPEN",
        SMB1_COMMAND_CREATE             => "SMB1_COMMAND_CREATE",
        SMB1_COMMAND_CLOSE              => "SMB1_COMMAND_CLOSE",
        SMB1_COMMAND_FLUSH              => "SMB1_COMMAND_FLUSH",
        SMB1_COMMAND_DELETE             => "SMB1_COMMAND_DELETE",
        SMB1_COMMAND_RENAME             => "SMB1_COMMAND_RENAME",
        SMB1_COMMAND_QUERY_INFORMATION  => "SMB1_COMMAND_QUERY_INFORMATION",
        SMB1_COMMAND_SET_INFORMATION    => "SMB1_COMMAND_SET_INFORMATION",
        SMB1_COMMAND_READ               => "SMB1_COMMAND_READ",
        SMB1_COMMAND_WRITE              => "SMB1_COMMAND_WRITE",
        SMB1_COMMAND_LOCK_BYTE_RANGE    => "SMB1_COMMAND_LOCK_BYTE_RANGE",
        SMB1_COMMAND_UNLOCK_BYTE_RANGE  => "SMB1_COMMAND_UNLOCK_BYTE_RANGE",
        SMB1_COMMAND_CREATE_TEMPORARY   => "SMB1_COMMAND_CREATE_TEMPORARY",
        SMB1_COMMAND_CREATE_NEW         => "SMB1_COMMAND_CREATE_NEW",
        SMB1_COMMAND_CHECK_DIRECTORY    => "SMB1_COMMAND_CHECK_DIRECTORY",
        SMB1_COMMAND_PROCESS_EXIT       => "SMB1_COMMAND_PROCESS_EXIT",
        SMB1_COMMAND_SEEK               => "SMB1_COMMAND_SEEK",
        SMB1_COMMAND_LOCK_AND_READ      => "SMB1_COMMAND_LOCK_AND_READ",
        SMB1_COMMAND_WRITE_AND_UNLOCK   => "SMB1_COMMAND_WRITE_AND_UNLOCK",
        SMB1_COMMAND_READ_RAW           => "SMB1_COMMAND_READ_RAW",
        SMB1_COMMAND_WRITE_RAW          => "SMB1_COMMAND_WRITE_RAW",
        SMB1_COMMAND_WRITE_COMPLETE     => "SMB1_COMMAND_WRITE_COMPLETE",
        SMB1_COMMAND_LOCKING_ANDX       => "SMB1_COMMAND_LOCKING_ANDX",
        SMB1_COMMAND_TRANS              => "SMB1_COMMAND_TRANS",
        SMB1_COMMAND_TRANS_SECONDARY    => "SMB1_COMMAND_TRANS_SECONDARY",
        SMB1_COMMAND_IOCTL              => "SMB1_COMMAND_IOCTL",
        SMB1_COMMAND_ECHO               => "SMB1_COMMAND_ECHO",
        SMB1_COMMAND_WRITE_AND_CLOSE    => "SMB1_COMMAND_WRITE_AND_CLOSE",
        SMB1_COMMAND_OPEN_ANDX          => "SMB1_COMMAND_OPEN_ANDX",
        SMB1_COMMAND_READ_ANDX          => "SMB1_COMMAND_READ_ANDX",
        SMB1_COMMAND_WRITE_ANDX         => "SMB1_COMMAND_WRITE_ANDX",
        SMB1_COMMAND_TRANS2             => "SMB1_COMMAND_TRANS2",
        SMB1_COMMAND_TRANS2_SECONDARY   => "SMB1_COMMAND_TRANS2_SECONDARY",
        SMB1_COMMAND_FIND_CLOSE2        => "SMB1_COMMAND_FIND_CLOSE2",
        SMB1_COMMAND_TREE_CONNECT       => "SMB1_COMMAND_TREE_CONNECT",
        SMB1_COMMAND_TREE_DISCONNECT    => "SMB1_COMMAND_TREE_DISCONNECT",
        SMB1_COMMAND_NEGOTIATE_PROTOCOL => "SMB1_COMMAND_NEGOTIATE_PROTOCOL",
        SMB1_COMMAND_SESSION_SETUP_ANDX => "SMB1_COMMAND_SESSION_SETUP_ANDX",
        SMB1_COMMAND_LOGOFF_ANDX        => "SMB1_COMMAND_LOGOFF_ANDX",
        SMB1_COMMAND_TREE_CONNECT_ANDX  => "SMB1_COMMAND_TREE_CONNECT_ANDX",
        SMB1_COMMAND_QUERY_INFO_DISK    => "SMB1_COMMAND_QUERY_INFO_DISK",
        SMB1_COMMAND_NT_TRANS           => "SMB1_COMMAND_NT_TRANS",
        SMB1_COMMAND_NT_TRANS_SECONDARY => "SMB1_COMMAND_NT_TRANS_SECONDARY",
        SMB1_COMMAND_NT_CREATE_ANDX     => "SMB1_COMMAND_NT_CREATE_ANDX",
        SMB1_COMMAND_NT_CANCEL          => "SMB1_COMMAND_NT_CANCEL",
        SMB1_COMMAND_OPEN_PRINT_FILE    => "SMB1_COMMAND_OPEN_PRINT_FILE",
        _ => { return (c).to_string(); },
    }.to_string()
}

pub fn smb1_command_is_andx(c: u8) -> bool {
    match c {
        SMB1_COMMAND_LOCKING_ANDX |
        SMB1_COMMAND_OPEN_ANDX |
        SMB1_COMMAND_READ_ANDX |
        SMB1_COMMAND_SESSION_SETUP_ANDX |
        SMB1_COMMAND_LOGOFF_ANDX |
        SMB1_COMMAND_TREE_CONNECT_ANDX |
        SMB1_COMMAND_NT_CREATE_ANDX |
        SMB1_COMMAND_WRITE_ANDX => true,
        _ => false,
    }
}

/// Primary transaction commands, the ones whose responses may come as
/// interim responses without parameter words.
pub fn smb1_is_trans_command(c: u8) -> bool {
    matches!(c, SMB1_COMMAND_TRANS | SMB1_COMMAND_TRANS2 | SMB1_COMMAND_NT_TRANS)
}

/// Primary command of a transaction secondary.
pub fn smb1_trans_primary(c: u8) -> Option<u8> {
    match c {
        SMB1_COMMAND_TRANS_SECONDARY => Some(SMB1_COMMAND_TRANS),
        SMB1_COMMAND_TRANS2_SECONDARY => Some(SMB1_COMMAND_TRANS2),
        SMB1_COMMAND_NT_TRANS_SECONDARY => Some(SMB1_COMMAND_NT_TRANS),
        _ => None,
    }
}

/// Commands that can start a PDU on a tree we have not seen connected.
fn smb1_command_needs_tid(c: u8) -> bool {
    !matches!(c,
        SMB1_COMMAND_NEGOTIATE_PROTOCOL |
        SMB1_COMMAND_SESSION_SETUP_ANDX |
        SMB1_COMMAND_LOGOFF_ANDX |
        SMB1_COMMAND_TREE_CONNECT |
        SMB1_COMMAND_TREE_CONNECT_ANDX)
}

pub fn smb1_deprecated_commands() -> ByteSet {
    ByteSet::from_slice(&[
        SMB1_COMMAND_OPEN,
        SMB1_COMMAND_CREATE,
        SMB1_COMMAND_READ,
        SMB1_COMMAND_WRITE,
        SMB1_COMMAND_CREATE_NEW,
        SMB1_COMMAND_LOCK_AND_READ,
        SMB1_COMMAND_WRITE_AND_UNLOCK,
        SMB1_COMMAND_READ_RAW,
        SMB1_COMMAND_WRITE_RAW,
        SMB1_COMMAND_WRITE_AND_CLOSE,
        SMB1_COMMAND_OPEN_ANDX,
        SMB1_COMMAND_TREE_CONNECT,
    ])
}

/// Handler result. Anything but `Ok` ends the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComStatus {
    Ok,
    /// Not tracked any further, not an anomaly.
    Ignore,
    Error,
}

/// One command of a PDU, as handed to its handler.
pub struct Smb1Com<'a> {
    pub hdr: &'a SmbRecord<'a>,
    pub info: ComInfo,
    /// Command block, from the word count to the end of the PDU.
    pub com: &'a [u8],
    /// Whole PDU, starting at the SMB header. Offsets in the PDU are
    /// relative to this.
    pub pdu: &'a [u8],
    /// Position of `com` in `pdu`.
    pub offset: usize,
    pub direction: Direction,
    pub rt: RequestId,
}

pub type Smb1ComFunc = fn(&mut SMBState, &Smb1Com, &mut dyn SmbHost) -> ComStatus;

pub fn smb1_handler_table() -> [Option<Smb1ComFunc>; 256] {
    let mut t: [Option<Smb1ComFunc>; 256] = [None; 256];
    t[SMB1_COMMAND_OPEN as usize] = Some(smb1_open);
    t[SMB1_COMMAND_CREATE as usize] = Some(smb1_open);
    t[SMB1_COMMAND_CREATE_NEW as usize] = Some(smb1_open);
    t[SMB1_COMMAND_CLOSE as usize] = Some(smb1_close);
    t[SMB1_COMMAND_RENAME as usize] = Some(smb1_rename);
    t[SMB1_COMMAND_READ as usize] = Some(smb1_read);
    t[SMB1_COMMAND_LOCK_AND_READ as usize] = Some(smb1_read);
    t[SMB1_COMMAND_WRITE as usize] = Some(smb1_write);
    t[SMB1_COMMAND_WRITE_AND_UNLOCK as usize] = Some(smb1_write);
    t[SMB1_COMMAND_READ_RAW as usize] = Some(smb1_read_raw);
    t[SMB1_COMMAND_WRITE_RAW as usize] = Some(smb1_write_raw);
    t[SMB1_COMMAND_WRITE_COMPLETE as usize] = Some(smb1_write_complete);
    t[SMB1_COMMAND_WRITE_AND_CLOSE as usize] = Some(smb1_write_and_close);
    t[SMB1_COMMAND_OPEN_ANDX as usize] = Some(smb1_open_andx);
    t[SMB1_COMMAND_NT_CREATE_ANDX as usize] = Some(smb1_open_andx);
    t[SMB1_COMMAND_READ_ANDX as usize] = Some(smb1_read_andx);
    t[SMB1_COMMAND_WRITE_ANDX as usize] = Some(smb1_write_andx);
    t[SMB1_COMMAND_TRANS as usize] = Some(smb1_trans);
    t[SMB1_COMMAND_TRANS_SECONDARY as usize] = Some(smb1_trans_secondary);
    t[SMB1_COMMAND_TRANS2 as usize] = Some(smb1_trans);
    t[SMB1_COMMAND_TRANS2_SECONDARY as usize] = Some(smb1_trans_secondary);
    t[SMB1_COMMAND_NT_TRANS as usize] = Some(smb1_trans);
    t[SMB1_COMMAND_NT_TRANS_SECONDARY as usize] = Some(smb1_trans_secondary);
    t[SMB1_COMMAND_TREE_CONNECT as usize] = Some(smb1_tree_connect);
    t[SMB1_COMMAND_TREE_DISCONNECT as usize] = Some(smb1_tree_disconnect);
    t[SMB1_COMMAND_NEGOTIATE_PROTOCOL as usize] = Some(smb1_negotiate);
    t[SMB1_COMMAND_SESSION_SETUP_ANDX as usize] = Some(smb1_session_setup_andx);
    t[SMB1_COMMAND_LOGOFF_ANDX as usize] = Some(smb1_logoff_andx);
    t[SMB1_COMMAND_TREE_CONNECT_ANDX as usize] = Some(smb1_tree_connect_andx);
    t
}

/// Inspect one SMB1 PDU. `pdu` starts at the SMB header.
pub fn smb1_inspect(state: &mut SMBState, direction: Direction, pdu: &[u8], host: &mut dyn SmbHost) {
    let hdr = match parse_smb_record(pdu) {
        Ok((_, hdr)) => hdr,
        Err(_) => { return; }
    };
    // requests and responses only count in their own direction
    if hdr.is_response() != direction.is_to_client() {
        return;
    }
    let smb_com = hdr.command;
    if state.ctx.tables.handlers[smb_com as usize].is_none() {
        SCLogDebug!("no handler for {}", smb1_command_string(smb_com));
        return;
    }
    if hdr.is_request() && smb_com == SMB1_COMMAND_NEGOTIATE_PROTOCOL &&
        state.ssn_flags.contains(SsnStateFlags::NEGOTIATED)
    {
        state.set_event(SMBEvent::MultipleNegotiations);
        return;
    }
    if smb1_command_needs_tid(smb_com) && !state.tids.contains(hdr.tree_id) {
        SCLogDebug!("tid {} not known, not inspecting", hdr.tree_id);
        return;
    }

    let rt = if hdr.is_request() && smb1_trans_primary(smb_com).is_none() {
        state.new_request(&hdr, smb_com)
    } else {
        state.find_request(&hdr, smb_com)
    };
    let rt = match rt {
        Some(rt) => rt,
        None => {
            SCLogDebug!("no request tracker for {} mid {}", smb1_command_string(smb_com), hdr.multiplex_id);
            return;
        }
    };
    if let Some(tracker) = state.requests.get_mut(rt) {
        if hdr.is_response() {
            tracker.keep = false;
        }
    }

    smb1_chain(state, direction, &hdr, pdu, rt, host);

    let (keep, discard) = match state.requests.get(rt) {
        Some(tracker) => (tracker.keep, tracker.discard),
        None => { return; }
    };
    if (hdr.is_request() && discard) || (hdr.is_response() && !keep) {
        state.remove_request(rt);
    }
}

/// Walk the AndX chain of a PDU, calling the handler of each command.
fn smb1_chain(state: &mut SMBState, direction: Direction, hdr: &SmbRecord, pdu: &[u8],
        rt: RequestId, host: &mut dyn SmbHost)
{
    let ctx = std::sync::Arc::clone(&state.ctx);
    let tables = &ctx.tables;
    let mut smb_com = hdr.command;
    let mut offset = SMB1_HEADER_SIZE;
    let mut chained: u32 = 0;

    loop {
        let com = &pdu[offset..];
        if hdr.is_request() && tables.deprecated.contains(smb_com) {
            state.set_event_args(SMBEvent::DeprecatedCommand, vec![AlertArg::Int(smb_com as u64)]);
        }

        let mut alerts = Vec::new();
        let info = tables.commands.check_command(state.policy, hdr, smb_com, com, &mut alerts);
        for a in alerts {
            state.set_event_args(a.event, a.args);
        }
        if info.is_status_error() &&
            hdr.status_is(SMB_NTSTATUS_PIPE_BROKEN, SMB_ERRCLASS_DOS, SMB_ERRDOS_BADPIPE)
        {
            let pipe = state.requests.get(rt).and_then(|t| t.pipe);
            if let Some(pipe) = pipe {
                SCLogDebug!("broken pipe, removing tracker");
                state.remove_pipe(pipe);
            }
        }

        let handler = match tables.handlers[smb_com as usize] {
            Some(h) => h,
            None => { break; }
        };
        let c = Smb1Com {
            hdr,
            info,
            com,
            pdu,
            offset,
            direction,
            rt,
        };
        let status = handler(state, &c, host);
        if status != ComStatus::Ok {
            SCLogDebug!("{} returned {:?}", smb1_command_string(smb_com), status);
            break;
        }
        if !smb1_command_is_andx(smb_com) || !info.can_process() {
            break;
        }
        let andx = match smb1_parse_andx_header::<nom7::error::Error<&[u8]>>(com) {
            Ok((_, andx)) => andx,
            Err(_) => { break; }
        };
        let next_com = andx.andx_command;
        if next_com == SMB1_COMMAND_NONE {
            break;
        }

        chained += 1;
        state.stats.chained += 1;
        let max_chain = ctx.config.max_chain as u32;
        if max_chain > 0 && chained == max_chain {
            state.set_event_args(SMBEvent::ExcessiveChaining, vec![AlertArg::Int(max_chain as u64)]);
        }

        if hdr.is_request() {
            match (smb_com, next_com) {
                (SMB1_COMMAND_SESSION_SETUP_ANDX, SMB1_COMMAND_LOGOFF_ANDX) => {
                    state.set_event(SMBEvent::ChainSessionSetupLogoff);
                }
                (SMB1_COMMAND_TREE_CONNECT_ANDX, SMB1_COMMAND_TREE_DISCONNECT) => {
                    state.set_event(SMBEvent::ChainTreeConnectDisconnect);
                }
                (SMB1_COMMAND_OPEN_ANDX, SMB1_COMMAND_CLOSE) |
                (SMB1_COMMAND_NT_CREATE_ANDX, SMB1_COMMAND_CLOSE) => {
                    state.set_event(SMBEvent::ChainOpenClose);
                }
                _ => {}
            }
        }

        let next = andx.andx_offset as usize;
        if next < offset + info.cmd_size as usize || next >= pdu.len() {
            state.set_event_args(SMBEvent::BadOffset, vec![
                    AlertArg::Int(next as u64), AlertArg::Int(pdu.len() as u64)]);
            break;
        }

        let class = match AndXClass::from_command(smb_com) {
            Some(class) => class,
            None => { break; }
        };
        if !tables.chains.is_allowed(state.policy, class, next_com) {
            SCLogDebug!("{} after {} not allowed under {}",
                    smb1_command_string(next_com), smb1_command_string(smb_com), state.policy);
            break;
        }

        if hdr.is_request() && smb1_opens_pipe(smb_com) && smb1_uses_pipe(next_com) {
            smb1_provisional_pipe(state, hdr, rt);
        }

        smb_com = next_com;
        offset = next;
    }
}

fn smb1_opens_pipe(c: u8) -> bool {
    matches!(c, SMB1_COMMAND_OPEN_ANDX | SMB1_COMMAND_NT_CREATE_ANDX)
}

fn smb1_uses_pipe(c: u8) -> bool {
    matches!(c,
        SMB1_COMMAND_WRITE |
        SMB1_COMMAND_WRITE_ANDX |
        SMB1_COMMAND_WRITE_AND_CLOSE |
        SMB1_COMMAND_READ |
        SMB1_COMMAND_READ_ANDX |
        SMB1_COMMAND_TRANS)
}

/// Pipe for a write or transaction chained behind an open in the same
/// request. It gets its FID from the open's response.
fn smb1_provisional_pipe(state: &mut SMBState, hdr: &SmbRecord, rt: RequestId) {
    let on_ipc = state.requests.get(rt).map(|t| t.on_ipc()).unwrap_or(false);
    if !on_ipc {
        return;
    }
    if let Some(pipe) = state.new_pipe(hdr.user_id, hdr.tree_id, None, false) {
        if let Some(tracker) = state.requests.get_mut(rt) {
            tracker.tmp_pipes.push_back(pipe);
        }
    }
}

/// Data at `offset` (relative to the SMB header) of `len` bytes. An
/// offset outside the PDU, or pointing back into the command's parameter
/// block, raises `BadOffset`. A length beyond the PDU raises
/// `NbLtDataSize` and the bytes present are returned.
pub fn smb1_com_data<'a>(state: &mut SMBState, com: &Smb1Com<'a>, offset: usize, len: usize)
    -> Result<&'a [u8], ()>
{
    if len == 0 {
        return Ok(&[]);
    }
    let pdu = com.pdu;
    if offset < com.offset + com.info.cmd_size as usize || offset > pdu.len() {
        state.set_event_args(SMBEvent::BadOffset, vec![
                AlertArg::Int(offset as u64), AlertArg::Int(pdu.len() as u64)]);
        return Err(());
    }
    let avail = pdu.len() - offset;
    if len > avail {
        state.set_event_args(SMBEvent::NbLtDataSize, vec![
                AlertArg::Int(len as u64), AlertArg::Int(avail as u64)]);
        return Ok(&pdu[offset..]);
    }
    Ok(&pdu[offset..offset + len])
}

fn smb1_check_data_size(state: &mut SMBState, bcc: u16, data_len: u32, present: usize) {
    if (bcc as u32) < data_len {
        state.set_event_args(SMBEvent::BccLtDataSize, vec![
                AlertArg::Int(bcc as u64), AlertArg::Int(data_len as u64)]);
    }
    if present < data_len as usize {
        state.set_event_args(SMBEvent::NbLtDataSize, vec![
                AlertArg::Int(data_len as u64), AlertArg::Int(present as u64)]);
    }
}

/// Request is on IPC$, directly, through a chained tree connect, or
/// through the TID the response carries.
pub fn smb1_com_on_ipc(state: &SMBState, com: &Smb1Com) -> bool {
    let rt_ipc = state.requests.get(com.rt).map(|t| t.on_ipc()).unwrap_or(false);
    rt_ipc || state.tid_is_ipc(com.hdr.tree_id).unwrap_or(false)
}

/// Pipe a request with `fid` goes to: a provisional pipe of an open
/// earlier in the chain, or the pipe the FID names.
pub fn smb1_request_pipe(state: &mut SMBState, com: &Smb1Com, fid: u16) -> Option<PipeId> {
    let tracker = state.requests.get(com.rt)?;
    if !tracker.on_ipc() {
        return None;
    }
    let pipe = match tracker.tmp_pipes.back() {
        Some(p) => Some(*p),
        None => state.find_pipe(com.hdr.user_id, com.hdr.tree_id, fid),
    };
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.pipe = pipe;
    }
    pipe
}

pub fn smb1_request_pipe_get(state: &SMBState, com: &Smb1Com) -> Option<PipeId> {
    state.requests.get(com.rt).and_then(|t| t.pipe)
}

/// Successful read, write or transaction on the request's pipe.
pub fn smb1_pipe_set_used(state: &mut SMBState, com: &Smb1Com) {
    if let Some(pipe) = smb1_request_pipe_get(state, com) {
        if let Some(pipe) = state.pipes.get_mut(pipe) {
            pipe.used = true;
        }
    }
}

fn smb1_forward(state: &mut SMBState, com: &Smb1Com, data: &[u8], host: &mut dyn SmbHost) {
    if let Some(pipe) = smb1_request_pipe_get(state, com) {
        state.pipe_forward(pipe, com.direction, data, host);
    }
}

/// Open, Create and CreateNew. Only the response matters: it carries
/// the FID.
fn smb1_open(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_request() || !com.info.can_process() {
        return ComStatus::Ok;
    }
    if !smb1_com_on_ipc(state, com) {
        return ComStatus::Ok;
    }
    let fid = match parse_smb1_fid_record(com.com) {
        Ok((_, fid)) => fid,
        Err(_) => { return ComStatus::Error; }
    };
    let pipe = state.new_pipe(com.hdr.user_id, com.hdr.tree_id, Some(fid), false);
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.pipe = pipe;
    }
    ComStatus::Ok
}

/// OpenAndX and NtCreateAndX. A provisional pipe queued for this
/// request gets the FID, otherwise a new pipe is created.
fn smb1_open_andx(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_request() || !com.info.can_process() {
        return ComStatus::Ok;
    }
    if !smb1_com_on_ipc(state, com) {
        return ComStatus::Ok;
    }
    let res = if com.info.smb_com == SMB1_COMMAND_OPEN_ANDX {
        parse_smb1_open_andx_response_record(com.com)
    } else {
        parse_smb1_nt_create_andx_response_record(com.com)
    };
    let open = match res {
        Ok((_, open)) => open,
        Err(_) => { return ComStatus::Error; }
    };
    let (uid, tid) = (com.hdr.user_id, com.hdr.tree_id);
    let tmp = state.requests.get_mut(com.rt).and_then(|t| t.tmp_pipes.pop_front());
    let pipe = match tmp {
        Some(pipe) => {
            state.bind_pipe(pipe, uid, tid, open.fid, open.is_byte_mode());
            Some(pipe)
        }
        None => state.new_pipe(uid, tid, Some(open.fid), open.is_byte_mode()),
    };
    SCLogDebug!("pipe opened, fid {:04x} byte mode {}", open.fid, open.is_byte_mode());
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.pipe = pipe;
    }
    ComStatus::Ok
}

fn smb1_close(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let fid = match parse_smb1_fid_record(com.com) {
            Ok((_, fid)) => fid,
            Err(_) => { return ComStatus::Error; }
        };
        if let Some(tracker) = state.requests.get_mut(com.rt) {
            tracker.fid = Some(fid);
        }
        return ComStatus::Ok;
    }
    let tracker = match state.requests.get(com.rt) {
        Some(t) => t,
        None => { return ComStatus::Ok; }
    };
    if let Some(fid) = tracker.fid {
        let pipe = state.find_pipe(tracker.uid, tracker.tid, fid);
        if let Some(pipe) = pipe {
            state.remove_pipe(pipe);
        }
    }
    ComStatus::Ok
}

fn smb1_rename(_state: &mut SMBState, _com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    ComStatus::Ok
}

/// Read and LockAndRead.
fn smb1_read(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let fid = match parse_smb1_fid_record(com.com) {
            Ok((_, fid)) => fid,
            Err(_) => { return ComStatus::Error; }
        };
        smb1_request_pipe(state, com, fid);
        return ComStatus::Ok;
    }
    if smb1_request_pipe_get(state, com).is_none() {
        return ComStatus::Ok;
    }
    let rd = match parse_smb1_read_response_record(com.com) {
        Ok((_, rd)) => rd,
        Err(_) => { return ComStatus::Error; }
    };
    if rd.buffer_format != SMB1_FORMAT_DATA_BLOCK {
        state.set_event_args(SMBEvent::BadFormat, vec![AlertArg::Int(rd.buffer_format as u64)]);
        return ComStatus::Error;
    }
    // format byte and length word come out of the byte count
    smb1_check_data_size(state, rd.bcc.saturating_sub(3), rd.data_len as u32, rd.data.len());
    smb1_forward(state, com, rd.data, host);
    smb1_pipe_set_used(state, com);
    ComStatus::Ok
}

/// Write and WriteAndUnlock.
fn smb1_write(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_request() {
        if !com.info.can_process() {
            return ComStatus::Ok;
        }
        let wr = match parse_smb1_write_request_record(com.com) {
            Ok((_, wr)) => wr,
            Err(_) => { return ComStatus::Error; }
        };
        if wr.buffer_format != SMB1_FORMAT_DATA_BLOCK {
            state.set_event_args(SMBEvent::BadFormat, vec![AlertArg::Int(wr.buffer_format as u64)]);
            return ComStatus::Error;
        }
        if smb1_request_pipe(state, com, wr.fid).is_none() {
            return ComStatus::Ok;
        }
        smb1_check_data_size(state, wr.bcc.saturating_sub(3), wr.data_len as u32, wr.data.len());
        smb1_forward(state, com, wr.data, host);
        return ComStatus::Ok;
    }

    if com.info.can_process() {
        smb1_pipe_set_used(state, com);
        return ComStatus::Ok;
    }
    if com.info.smb_com == SMB1_COMMAND_WRITE_AND_UNLOCK && com.info.is_status_error() {
        // The write went through but the unlock failed. On a pipe the
        // unlock can not work, on a file the range may not have been
        // locked.
        let ipc = smb1_com_on_ipc(state, com);
        let hdr = com.hdr;
        if ipc && hdr.status_is(SMB_NTSTATUS_INVALID_DEVICE_REQUEST, SMB_ERRCLASS_DOS, SMB_ERRDOS_BADFUNC) {
            smb1_pipe_set_used(state, com);
        } else if !ipc && hdr.status_is(SMB_NTSTATUS_RANGE_NOT_LOCKED, SMB_ERRCLASS_DOS, SMB_ERRDOS_NOTLOCKED) {
            SCLogDebug!("write and unlock: write succeeded, range not locked");
        }
    }
    ComStatus::Ok
}

fn smb1_write_and_close(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let wr = match parse_smb1_write_and_close_request_record(com.com) {
            Ok((_, wr)) => wr,
            Err(_) => { return ComStatus::Error; }
        };
        if let Some(tracker) = state.requests.get_mut(com.rt) {
            tracker.fid = Some(wr.fid);
        }
        if smb1_request_pipe(state, com, wr.fid).is_none() {
            return ComStatus::Ok;
        }
        // one pad byte in front of the data
        smb1_check_data_size(state, wr.bcc.saturating_sub(1), wr.count as u32, wr.data.len());
        smb1_forward(state, com, wr.data, host);
        return ComStatus::Ok;
    }
    if let Some(pipe) = smb1_request_pipe_get(state, com) {
        state.remove_pipe(pipe);
    }
    ComStatus::Ok
}

fn smb1_read_andx(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let fid = match parse_smb1_andx_fid_record(com.com) {
            Ok((_, fid)) => fid,
            Err(_) => { return ComStatus::Error; }
        };
        smb1_request_pipe(state, com, fid);
        return ComStatus::Ok;
    }
    if smb1_request_pipe_get(state, com).is_none() {
        return ComStatus::Ok;
    }
    let rd = match parse_smb1_read_andx_response_record(com.com) {
        Ok((_, rd)) => rd,
        Err(_) => { return ComStatus::Error; }
    };
    if (rd.bcc as u32) < rd.data_len {
        state.set_event_args(SMBEvent::BccLtDataSize, vec![
                AlertArg::Int(rd.bcc as u64), AlertArg::Int(rd.data_len as u64)]);
    }
    let data = match smb1_com_data(state, com, rd.data_offset as usize, rd.data_len as usize) {
        Ok(data) => data,
        Err(_) => { return ComStatus::Error; }
    };
    smb1_forward(state, com, data, host);
    smb1_pipe_set_used(state, com);
    ComStatus::Ok
}

fn smb1_write_andx(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_response() {
        smb1_pipe_set_used(state, com);
        return ComStatus::Ok;
    }
    let wr = match parse_smb1_write_andx_request_record(com.com) {
        Ok((_, wr)) => wr,
        Err(_) => { return ComStatus::Error; }
    };
    if smb1_request_pipe(state, com, wr.fid).is_none() {
        return ComStatus::Ok;
    }
    if (wr.bcc as u32) < wr.data_len {
        state.set_event_args(SMBEvent::BccLtDataSize, vec![
                AlertArg::Int(wr.bcc as u64), AlertArg::Int(wr.data_len as u64)]);
    }
    let data = match smb1_com_data(state, com, wr.data_offset as usize, wr.data_len as usize) {
        Ok(data) => data,
        Err(_) => { return ComStatus::Error; }
    };
    smb1_forward(state, com, data, host);
    ComStatus::Ok
}

/// An accepted ReadRaw request makes the next server frame raw data.
fn smb1_read_raw(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_response() || !com.info.can_process() {
        return ComStatus::Ok;
    }
    let fid = match parse_smb1_fid_record(com.com) {
        Ok((_, fid)) => fid,
        Err(_) => { return ComStatus::Error; }
    };
    smb1_request_pipe(state, com, fid);
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.fid = Some(fid);
    }
    state.pdu_state = PduState::RawData(Direction::ToClient);
    state.raw_request = Some(com.rt);
    ComStatus::Ok
}

fn smb1_write_raw(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let wr = match parse_smb1_write_raw_request_record(com.com) {
            Ok((_, wr)) => wr,
            Err(_) => { return ComStatus::Error; }
        };
        if (wr.bcc as u32) < wr.data_len as u32 {
            state.set_event_args(SMBEvent::BccLtDataSize, vec![
                    AlertArg::Int(wr.bcc as u64), AlertArg::Int(wr.data_len as u64)]);
        }
        if wr.data_len > wr.count {
            state.set_event_args(SMBEvent::TdcntLtDataSize, vec![
                    AlertArg::Int(wr.count as u64), AlertArg::Int(wr.data_len as u64)]);
            return ComStatus::Error;
        }
        let data = match smb1_com_data(state, com, wr.data_offset as usize, wr.data_len as usize) {
            Ok(data) => data,
            Err(_) => { return ComStatus::Error; }
        };
        let pipe = smb1_request_pipe(state, com, wr.fid);
        if let Some(tracker) = state.requests.get_mut(com.rt) {
            tracker.fid = Some(wr.fid);
            tracker.writeraw_remaining = (wr.count - wr.data_len) as u32;
            tracker.writeraw_writethrough = wr.write_mode & SMB1_WRITE_MODE_WRITE_THROUGH != 0;
        }
        if pipe.is_some() {
            smb1_forward(state, com, data, host);
        }
        return ComStatus::Ok;
    }

    // interim response, the client may now send the rest raw
    let remaining = state.requests.get(com.rt).map(|t| t.writeraw_remaining).unwrap_or(0);
    if remaining > 0 {
        state.pdu_state = PduState::RawData(Direction::ToServer);
        state.raw_request = Some(com.rt);
        if let Some(tracker) = state.requests.get_mut(com.rt) {
            tracker.keep = true;
        }
    }
    ComStatus::Ok
}

fn smb1_write_complete(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_response() && com.info.can_process() {
        smb1_pipe_set_used(state, com);
    }
    ComStatus::Ok
}

/// The raw data frame of a ReadRaw or WriteRaw exchange. `data` is the
/// whole NetBIOS payload.
pub fn smb1_raw_data(state: &mut SMBState, direction: Direction, data: &[u8], host: &mut dyn SmbHost) {
    let rt = match state.raw_request.take() {
        Some(rt) => rt,
        None => { return; }
    };
    let (pipe, remaining, writethrough) = match state.requests.get(rt) {
        Some(t) => (t.pipe, t.writeraw_remaining, t.writeraw_writethrough),
        None => { return; }
    };
    SCLogDebug!("raw data {} bytes {}", data.len(), direction);

    if direction.is_to_server() {
        if data.len() > remaining as usize {
            state.set_event_args(SMBEvent::TdcntLtDataSize, vec![
                    AlertArg::Int(remaining as u64), AlertArg::Int(data.len() as u64)]);
            state.remove_request(rt);
            return;
        }
        if let Some(pipe) = pipe {
            state.pipe_forward(pipe, direction, data, host);
        }
        if writethrough && !data.is_empty() {
            // WriteComplete follows
            if let Some(tracker) = state.requests.get_mut(rt) {
                tracker.writeraw_remaining = 0;
            }
            return;
        }
        state.remove_request(rt);
        return;
    }

    if let Some(pipe) = pipe {
        state.pipe_forward(pipe, direction, data, host);
        if !data.is_empty() {
            if let Some(pipe) = state.pipes.get_mut(pipe) {
                pipe.used = true;
            }
        }
    }
    state.remove_request(rt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_handler_table() {
        let t = smb1_handler_table();
        assert!(t[SMB1_COMMAND_NT_CREATE_ANDX as usize].is_some());
        assert!(t[SMB1_COMMAND_TRANS2_SECONDARY as usize].is_some());
        assert!(t[SMB1_COMMAND_ECHO as usize].is_none());
        assert_eq!(t.iter().filter(|h| h.is_some()).count(), 29);
    }

    #[test_case(SMB1_COMMAND_TRANS_SECONDARY, Some(SMB1_COMMAND_TRANS))]
    #[test_case(SMB1_COMMAND_NT_TRANS_SECONDARY, Some(SMB1_COMMAND_NT_TRANS))]
    #[test_case(SMB1_COMMAND_TRANS, None)]
    fn test_trans_primary(c: u8, primary: Option<u8>) {
        assert_eq!(smb1_trans_primary(c), primary);
    }

    #[test]
    fn test_deprecated() {
        let d = smb1_deprecated_commands();
        assert!(d.contains(SMB1_COMMAND_WRITE_RAW));
        assert!(d.contains(SMB1_COMMAND_TREE_CONNECT));
        assert!(!d.contains(SMB1_COMMAND_WRITE_ANDX));
        assert!(!d.contains(SMB1_COMMAND_TREE_CONNECT_ANDX));
    }

    #[test]
    fn test_command_string() {
        assert_eq!(smb1_command_string(SMB1_COMMAND_WRITE_RAW), "SMB1_COMMAND_WRITE_RAW");
        assert_eq!(smb1_command_string(0xfe), "254");
    }
}
