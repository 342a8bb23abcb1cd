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

//! Negotiate, session setup, logoff and tree connect handling.

use crate::smb::events::*;
use crate::smb::fingerprint::fingerprint;
use crate::smb::smb::*;
use crate::smb::smb1::*;
use crate::smb::smb1_records::*;

/// Dialects that are not deprecated.
fn smb1_dialect_is_current(d: &str) -> bool {
    d == "NT LM 0.12" || d == "NT LANMAN 1.0" || d.starts_with("SMB 2")
}

pub fn smb1_negotiate(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_request() {
        state.ssn_flags.insert(SsnStateFlags::NEGOTIATED);
    }
    if !com.info.can_process() {
        return ComStatus::Ok;
    }

    if com.info.is_request() {
        let neg = match parse_smb1_negotiate_protocol_record(com.com) {
            Ok((_, neg)) => neg,
            Err(_) => { return ComStatus::Error; }
        };
        state.dialects.clear();
        let mut status = ComStatus::Ok;
        for (format, name) in neg.dialects {
            if format != SMB1_FORMAT_DIALECT {
                state.set_event_args(SMBEvent::BadFormat, vec![AlertArg::Int(format as u64)]);
                status = ComStatus::Error;
            }
            // keep the slot, the response refers to dialects by index
            state.dialects.push(String::from_utf8_lossy(name).to_string());
        }
        SCLogDebug!("dialects {:?}", state.dialects);
        return status;
    }

    let resp = match parse_smb1_negotiate_protocol_response_record(com.com) {
        Ok((_, resp)) => resp,
        Err(_) => { return ComStatus::Error; }
    };
    state.dialect_index = Some(resp.dialect_idx);
    if let Some(mpx) = resp.max_mpx_count {
        if mpx > 0 {
            state.max_outstanding = mpx;
        }
    }
    let dialect = state.dialects.get(resp.dialect_idx as usize).cloned();
    if let Some(dialect) = dialect {
        SCLogDebug!("dialect {} selected", dialect);
        if !smb1_dialect_is_current(&dialect) {
            state.set_event_args(SMBEvent::DeprecatedDialect, vec![AlertArg::Str(dialect)]);
        }
    }
    ComStatus::Ok
}

pub fn smb1_session_setup_andx(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        if state.ctx.config.fp_client && !state.ssn_flags.contains(SsnStateFlags::FP_CLIENT) {
            if let Ok((_, native)) = parse_smb1_session_setup_request_native(com.com, com.hdr, com.offset) {
                if let Some(policy) = fingerprint(&native) {
                    SCLogDebug!("client fingerprinted as {}", policy);
                    state.client_policy = Some(policy);
                    state.ssn_flags.insert(SsnStateFlags::FP_CLIENT);
                }
            }
        }
        return ComStatus::Ok;
    }

    state.insert_uid(com.hdr.user_id);
    if state.ctx.config.fp_server && !state.ssn_flags.contains(SsnStateFlags::FP_SERVER) {
        if let Ok((_, native)) = parse_smb1_session_setup_response_native(com.com, com.hdr, com.offset) {
            if let Some(policy) = fingerprint(&native) {
                SCLogDebug!("server fingerprinted as {}, was {}", policy, state.policy);
                state.policy = policy;
                state.ssn_flags.insert(SsnStateFlags::FP_SERVER);
            }
        }
    }
    ComStatus::Ok
}

pub fn smb1_logoff_andx(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_response() && com.info.can_process() {
        state.remove_uid(com.hdr.user_id);
    }
    ComStatus::Ok
}

/// Check the share of a tree connect path against the configured
/// invalid shares. Returns whether the share is IPC$.
fn smb1_check_share(state: &mut SMBState, path: &[u8]) -> bool {
    let share = match path.iter().rposition(|&c| c == b'\\') {
        Some(pos) => &path[pos + 1..],
        None => path,
    };
    let share = String::from_utf8_lossy(share).to_ascii_uppercase();
    SCLogDebug!("tree connect to share {}", share);
    if state.ctx.config.invalid_shares.iter().any(|s| *s == share) {
        state.set_event_args(SMBEvent::InvalidShare, vec![AlertArg::Str(share.clone())]);
    }
    share == "IPC$"
}

fn smb1_set_share_is_ipc(state: &mut SMBState, com: &Smb1Com, is_ipc: bool) {
    if let Some(tracker) = state.requests.get_mut(com.rt) {
        tracker.share_is_ipc = is_ipc;
    }
}

fn smb1_share_is_ipc(state: &SMBState, com: &Smb1Com) -> bool {
    state.requests.get(com.rt).map(|t| t.share_is_ipc).unwrap_or(false)
}

pub fn smb1_tree_connect_andx(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let tc = match parse_smb_connect_tree_andx_record(com.com, com.hdr, com.offset) {
            Ok((_, tc)) => tc,
            Err(_) => { return ComStatus::Error; }
        };
        let is_ipc = smb1_check_share(state, &tc.path) || tc.service == b"IPC";
        smb1_set_share_is_ipc(state, com, is_ipc);
        return ComStatus::Ok;
    }

    let service = match parse_smb_connect_tree_andx_response_record(com.com) {
        Ok((_, service)) => service,
        Err(_) => { return ComStatus::Error; }
    };
    let is_ipc = service == b"IPC" || smb1_share_is_ipc(state, com);
    state.insert_tid(com.hdr.tree_id, is_ipc);
    ComStatus::Ok
}

pub fn smb1_tree_connect(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if !com.info.can_process() {
        return ComStatus::Ok;
    }
    if com.info.is_request() {
        let (format, path) = match parse_smb_connect_tree_record(com.com) {
            Ok((_, r)) => r,
            Err(_) => { return ComStatus::Error; }
        };
        if format != SMB1_FORMAT_ASCII {
            state.set_event_args(SMBEvent::BadFormat, vec![AlertArg::Int(format as u64)]);
            return ComStatus::Error;
        }
        let is_ipc = smb1_check_share(state, path);
        smb1_set_share_is_ipc(state, com, is_ipc);
        return ComStatus::Ok;
    }

    let tid = match parse_smb_connect_tree_response_record(com.com) {
        Ok((_, tid)) => tid,
        Err(_) => { return ComStatus::Error; }
    };
    let is_ipc = smb1_share_is_ipc(state, com);
    state.insert_tid(tid, is_ipc);
    ComStatus::Ok
}

pub fn smb1_tree_disconnect(state: &mut SMBState, com: &Smb1Com, _host: &mut dyn SmbHost) -> ComStatus {
    if com.info.is_response() && com.info.can_process() {
        state.remove_tid(com.hdr.tree_id);
    }
    ComStatus::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("NT LM 0.12", true)]
    #[test_case("NT LANMAN 1.0", true)]
    #[test_case("SMB 2.002", true)]
    #[test_case("SMB 2.???", true)]
    #[test_case("LANMAN2.1", false)]
    #[test_case("PC NETWORK PROGRAM 1.0", false)]
    fn test_dialect_is_current(d: &str, current: bool) {
        assert_eq!(smb1_dialect_is_current(d), current);
    }
}
