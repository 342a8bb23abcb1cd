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

//! Transaction, Transaction2 and NtTransact handling.
//!
//! Requests and responses may be split over a primary command and any
//! number of secondaries. Fragments are placed at their displacement in
//! the tracker's buffers and the payload is handed on once both the
//! parameter and the data totals are reached.

use crate::direction::Direction;

use crate::smb::dcerpc::*;
use crate::smb::events::*;
use crate::smb::smb::*;
use crate::smb::smb1::*;
use crate::smb::smb1_records::*;
use crate::smb::trans::*;

/// Offset of the second setup word of a Transaction request, the FID of
/// the named pipe subcommands.
const SMB1_TRANS_FID_OFFSET: usize = 31;

fn smb1_trans_base_wct(smb_com: u8) -> u8 {
    if smb_com == SMB1_COMMAND_NT_TRANS { 19 } else { 14 }
}

fn smb1_trans_tracker_take(state: &mut SMBState, com: &Smb1Com) -> Option<TransTracker> {
    state.requests.get_mut(com.rt).and_then(|t| t.trans.take())
}

fn smb1_trans_tracker_put(state: &mut SMBState, com: &Smb1Com, tt: TransTracker) {
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.trans = Some(tt);
    }
}

fn smb1_trans_set_discard(state: &mut SMBState, com: &Smb1Com) {
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.discard = true;
    }
}

fn smb1_trans_set_keep(state: &mut SMBState, com: &Smb1Com) {
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.keep = true;
    }
}

/// Request phase failure. Count overflows end the transaction under
/// every policy, other failures only under Samba, where the server
/// throws the whole transaction away.
fn smb1_trans_request_failed(state: &mut SMBState, com: &Smb1Com, tt: TransTracker,
        overflow: bool) -> ComStatus
{
    smb1_trans_tracker_put(state, com, tt);
    if overflow || state.policy.traits().trans_error_discards_all {
        smb1_trans_set_discard(state, com);
    }
    ComStatus::Error
}

fn smb1_trans_count_alert(state: &mut SMBState, event: SMBEvent, tt: &TransTracker,
        frag: &SmbTransFragment)
{
    state.set_event_args(event, vec![
            AlertArg::Int(tt.tdcnt as u64),
            AlertArg::Int(frag.data_cnt as u64),
            AlertArg::Int(frag.data_disp as u64)]);
}

/// Start buffering when the first fragment does not carry everything.
fn smb1_trans_start_buffering(state: &mut SMBState, tt: &mut TransTracker,
        frag: &SmbTransFragment) -> Result<(), ComStatus>
{
    if tt.is_single_fragment(frag) {
        return Ok(());
    }
    let size = tt.buffer_size();
    if size > SMB_TRANS_BUF_MAX {
        SCLogDebug!("transaction of {} bytes not tracked", size);
        return Err(ComStatus::Ignore);
    }
    if !state.mem_alloc(size) {
        return Err(ComStatus::Error);
    }
    tt.mem += size;
    tt.buffered = true;
    Ok(())
}

/// Hand on a transaction payload rebuilt from several fragments.
fn smb1_trans_reassembled(state: &mut SMBState, com: &Smb1Com, data: &[u8], host: &mut dyn SmbHost) {
    state.stats.trans_reassembled += 1;
    let pdu = smb1_mock_pdu(&com.pdu[..SMB1_HEADER_SIZE], data);
    host.reassembled_pdu(com.direction, RpktType::Trans, &pdu);
}

fn smb1_trans_forward(state: &mut SMBState, com: &Smb1Com, data: &[u8], buffered: bool,
        host: &mut dyn SmbHost)
{
    if let Some(pipe) = smb1_request_pipe_get(state, com) {
        if buffered {
            smb1_trans_reassembled(state, com, data, host);
        }
        state.pipe_forward(pipe, com.direction, data, host);
    }
}

/// Transaction subcommand carries named pipe payload in its data.
fn smb1_trans_has_pipe_data(tt: &TransTracker, direction: Direction) -> bool {
    if tt.smb_com != SMB1_COMMAND_TRANS {
        return false;
    }
    match tt.subcom {
        TRANS_TRANSACT_NMPIPE => true,
        TRANS_WRITE_NMPIPE => direction.is_to_server(),
        TRANS_READ_NMPIPE => direction.is_to_client(),
        _ => false,
    }
}

/// Primary Transaction, Transaction2 and NtTransact.
pub fn smb1_trans(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_request() {
        smb1_trans_request(state, com, host)
    } else {
        smb1_trans_response(state, com, host)
    }
}

/// Transaction, Transaction2 and NtTransact secondaries. These only
/// exist as requests, responses carry the primary command.
pub fn smb1_trans_secondary(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_response() {
        return ComStatus::Ok;
    }
    if !com.info.can_process() {
        return ComStatus::Error;
    }
    let res = if com.info.smb_com == SMB1_COMMAND_NT_TRANS_SECONDARY {
        parse_smb1_nt_trans_secondary_record(com.com)
    } else {
        parse_smb1_trans_secondary_record(com.com)
    };
    let frag = match res {
        Ok((_, frag)) => frag,
        Err(_) => { return ComStatus::Error; }
    };
    smb1_trans_request_fragment(state, com, &frag, false, host)
}

fn smb1_trans_request(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        smb1_trans_set_discard(state, com);
        return ComStatus::Error;
    }
    let smb_com = com.info.smb_com;
    let res = if smb_com == SMB1_COMMAND_NT_TRANS {
        parse_smb1_nt_trans_request_record(com.com)
    } else {
        parse_smb1_trans_request_record(com.com)
    };
    let frag = match res {
        Ok((_, frag)) => frag,
        Err(_) => {
            smb1_trans_set_discard(state, com);
            return ComStatus::Error;
        }
    };

    let wct = com.info.word_count;
    if wct as u32 != smb1_trans_base_wct(smb_com) as u32 + frag.setup_cnt as u32 {
        state.set_event_args(SMBEvent::InvalidSetupCount, vec![
                AlertArg::Int(frag.setup_cnt as u64), AlertArg::Int(wct as u64)]);
        smb1_trans_set_discard(state, com);
        return ComStatus::Error;
    }

    let tracked = match (smb_com, frag.subcom) {
        (SMB1_COMMAND_TRANS, TRANS_TRANSACT_NMPIPE) |
        (SMB1_COMMAND_TRANS, TRANS_READ_NMPIPE) |
        (SMB1_COMMAND_TRANS, TRANS_WRITE_NMPIPE) |
        (SMB1_COMMAND_TRANS, TRANS_SET_NMPIPE_STATE) => {
            if frag.setup_cnt != 2 {
                state.set_event_args(SMBEvent::InvalidSetupCount, vec![
                        AlertArg::Int(frag.setup_cnt as u64), AlertArg::Int(wct as u64)]);
                smb1_trans_set_discard(state, com);
                return ComStatus::Error;
            }
            true
        }
        (SMB1_COMMAND_TRANS2, TRANS2_OPEN2) |
        (SMB1_COMMAND_NT_TRANS, NT_TRANSACT_CREATE) => {
            state.set_event_args(SMBEvent::UnusualCommand, vec![
                    AlertArg::Int(smb_com as u64), AlertArg::Int(frag.subcom as u64)]);
            true
        }
        _ => false,
    };
    if !tracked || !smb1_com_on_ipc(state, com) {
        SCLogDebug!("{} subcommand {:04x} not tracked", smb1_command_string(smb_com), frag.subcom);
        smb1_trans_set_discard(state, com);
        return ComStatus::Ignore;
    }

    if smb_com == SMB1_COMMAND_TRANS {
        let fid = match com.com.get(SMB1_TRANS_FID_OFFSET..SMB1_TRANS_FID_OFFSET + 2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]),
            None => {
                smb1_trans_set_discard(state, com);
                return ComStatus::Error;
            }
        };
        if smb1_request_pipe(state, com, fid).is_none() {
            SCLogDebug!("no pipe for fid {:04x}", fid);
            smb1_trans_set_discard(state, com);
            return ComStatus::Ignore;
        }
        if frag.total_data_cnt == 0 &&
            (frag.subcom == TRANS_TRANSACT_NMPIPE || frag.subcom == TRANS_WRITE_NMPIPE)
        {
            state.set_event_args(SMBEvent::TdcntZero, vec![AlertArg::Int(frag.subcom as u64)]);
        }
    }

    let tt = TransTracker::new(smb_com, &frag);
    smb1_trans_tracker_put(state, com, tt);
    smb1_trans_request_fragment(state, com, &frag, true, host)
}

/// Add a request fragment, primary or secondary, to the transaction.
fn smb1_trans_request_fragment(state: &mut SMBState, com: &Smb1Com, frag: &SmbTransFragment,
        first: bool, host: &mut dyn SmbHost) -> ComStatus
{
    let mut tt = match smb1_trans_tracker_take(state, com) {
        Some(tt) => tt,
        None => { return ComStatus::Ignore; }
    };
    if tt.request_done {
        // nothing more is expected from the client
        state.set_event_args(SMBEvent::DataSentGtTdcnt, vec![
                AlertArg::Int(tt.tdcnt as u64), AlertArg::Int(frag.data_cnt as u64)]);
        return smb1_trans_request_failed(state, com, tt, true);
    }
    if let Err(event) = tt.check_fragment(frag, first) {
        smb1_trans_count_alert(state, event, &tt, frag);
        return smb1_trans_request_failed(state, com, tt, true);
    }
    let params = match smb1_com_data(state, com, frag.param_offset as usize, frag.param_cnt as usize) {
        Ok(p) => p,
        Err(_) => { return smb1_trans_request_failed(state, com, tt, false); }
    };
    let data = match smb1_com_data(state, com, frag.data_offset as usize, frag.data_cnt as usize) {
        Ok(d) => d,
        Err(_) => { return smb1_trans_request_failed(state, com, tt, false); }
    };
    if first {
        if let Err(status) = smb1_trans_start_buffering(state, &mut tt, frag) {
            smb1_trans_tracker_put(state, com, tt);
            smb1_trans_set_discard(state, com);
            return status;
        }
    }
    tt.add_fragment(frag, params, data);

    let pipe_data = smb1_trans_has_pipe_data(&tt, com.direction);
    if !tt.buffered && pipe_data {
        smb1_trans_forward(state, com, data, false, host);
    }
    if tt.is_complete() {
        tt.request_done = true;
        if tt.buffered && pipe_data {
            let tdcnt = tt.tdcnt as usize;
            smb1_trans_forward(state, com, &tt.dbuf[..tdcnt], true, host);
        }
        if tt.smb_com == SMB1_COMMAND_TRANS && tt.subcom == TRANS_SET_NMPIPE_STATE {
            let p: &[u8] = if tt.buffered { &tt.pbuf } else { params };
            if p.len() >= 2 {
                let pipe_state = u16::from_le_bytes([p[0], p[1]]);
                tt.pipe_byte_mode = Some(pipe_state & SMB_PIPE_READ_MODE_MESSAGE == 0);
            }
        }
        if tt.one_way {
            SCLogDebug!("one way transaction done");
            smb1_trans_set_discard(state, com);
        }
    }
    smb1_trans_tracker_put(state, com, tt);
    ComStatus::Ok
}

fn smb1_trans_response(state: &mut SMBState, com: &Smb1Com, host: &mut dyn SmbHost) -> ComStatus {
    let mut tt = match smb1_trans_tracker_take(state, com) {
        Some(tt) => tt,
        None => { return ComStatus::Ok; }
    };
    if !com.info.can_process() {
        smb1_trans_tracker_put(state, com, tt);
        return ComStatus::Ok;
    }
    if com.info.word_count == 0 {
        // interim response, the server wants the secondaries
        SCLogDebug!("interim response, request done {}", tt.request_done);
        smb1_trans_tracker_put(state, com, tt);
        smb1_trans_set_keep(state, com);
        return ComStatus::Ok;
    }

    let res = if tt.smb_com == SMB1_COMMAND_NT_TRANS {
        parse_smb1_nt_trans_secondary_record(com.com)
    } else {
        parse_smb1_trans_response_record(com.com)
    };
    let frag = match res {
        Ok((_, frag)) => frag,
        Err(_) => {
            smb1_trans_tracker_put(state, com, tt);
            return ComStatus::Error;
        }
    };

    let first = !tt.response_started;
    if first {
        let freed = tt.start_response(&frag);
        state.mem_free(freed);
    }
    if let Err(event) = tt.check_fragment(&frag, first) {
        smb1_trans_count_alert(state, event, &tt, &frag);
        smb1_trans_tracker_put(state, com, tt);
        return ComStatus::Error;
    }
    let params = match smb1_com_data(state, com, frag.param_offset as usize, frag.param_cnt as usize) {
        Ok(p) => p,
        Err(_) => {
            smb1_trans_tracker_put(state, com, tt);
            return ComStatus::Error;
        }
    };
    let data = match smb1_com_data(state, com, frag.data_offset as usize, frag.data_cnt as usize) {
        Ok(d) => d,
        Err(_) => {
            smb1_trans_tracker_put(state, com, tt);
            return ComStatus::Error;
        }
    };
    if first {
        if let Err(status) = smb1_trans_start_buffering(state, &mut tt, &frag) {
            smb1_trans_tracker_put(state, com, tt);
            return status;
        }
    }
    tt.add_fragment(&frag, params, data);

    if !tt.is_complete() {
        smb1_trans_tracker_put(state, com, tt);
        smb1_trans_set_keep(state, com);
        return ComStatus::Ok;
    }

    let (all_params, all_data): (&[u8], &[u8]) = if tt.buffered {
        (&tt.pbuf[..tt.tpcnt as usize], &tt.dbuf[..tt.tdcnt as usize])
    } else {
        (params, data)
    };
    let status = smb1_trans_complete(state, com, &tt, all_params, all_data, host);
    if tt.disconnect_tid {
        let tid = state.requests.get(com.rt).map(|t| t.tid);
        if let Some(tid) = tid {
            SCLogDebug!("transaction disconnects tid {}", tid);
            state.remove_tid(tid);
        }
    }
    smb1_trans_tracker_put(state, com, tt);
    status
}

/// Final response of a transaction, with the complete parameters and
/// data.
fn smb1_trans_complete(state: &mut SMBState, com: &Smb1Com, tt: &TransTracker,
        params: &[u8], data: &[u8], host: &mut dyn SmbHost) -> ComStatus
{
    match (tt.smb_com, tt.subcom) {
        (SMB1_COMMAND_TRANS, TRANS_TRANSACT_NMPIPE) |
        (SMB1_COMMAND_TRANS, TRANS_READ_NMPIPE) => {
            smb1_trans_forward(state, com, data, tt.buffered, host);
            smb1_pipe_set_used(state, com);
        }
        (SMB1_COMMAND_TRANS, TRANS_WRITE_NMPIPE) => {
            smb1_pipe_set_used(state, com);
        }
        (SMB1_COMMAND_TRANS, TRANS_SET_NMPIPE_STATE) => {
            if let (Some(byte_mode), Some(pipe)) = (tt.pipe_byte_mode, smb1_request_pipe_get(state, com)) {
                if let Some(pipe) = state.pipes.get_mut(pipe) {
                    pipe.byte_mode = byte_mode;
                }
            }
            smb1_pipe_set_used(state, com);
        }
        (SMB1_COMMAND_TRANS2, TRANS2_OPEN2) |
        (SMB1_COMMAND_NT_TRANS, NT_TRANSACT_CREATE) => {
            let res = if tt.smb_com == SMB1_COMMAND_TRANS2 {
                parse_trans2_open2_response_params(params)
            } else {
                parse_nt_trans_create_response_params(params)
            };
            let open = match res {
                Ok((_, open)) => open,
                Err(_) => { return ComStatus::Error; }
            };
            if smb1_com_on_ipc(state, com) {
                let pipe = state.new_pipe(com.hdr.user_id, com.hdr.tree_id, Some(open.fid),
                        open.is_byte_mode());
                if let Some(tracker) = state.requests.get_mut(com.rt) {
                    tracker.pipe = pipe;
                }
            }
        }
        _ => {}
    }
    ComStatus::Ok
}
