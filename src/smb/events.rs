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

use crate::smb::smb::*;

#[derive(AppLayerEvent, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SMBEvent {
    /// NetBIOS message type not valid, or not valid for the direction.
    BadNbssType,
    /// Request flag on a response or the other way around.
    BadSmbType,
    /// Neither an SMB1 nor an SMB2 marker where the SMB header should be.
    BadSmbId,
    BadWordCount,
    BadByteCount,
    /// Unexpected buffer format byte.
    BadFormat,
    BadOffset,
    TdcntZero,
    NbLtSmbHdr,
    NbLtCom,
    NbLtBcc,
    NbLtDataSize,
    TdcntLtDataSize,
    DataSentGtTdcnt,
    BccLtDataSize,
    InvalidSetupCount,
    ExcessiveChaining,
    ChainSessionSetupLogoff,
    ChainTreeConnectDisconnect,
    ChainOpenClose,
    InvalidShare,
    DeprecatedCommand,
    UnusualCommand,
    DeprecatedDialect,
    MultipleNegotiations,
    MaxRequestsExceeded,
    RequestsSameMid,
    Memcap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertArg {
    Int(u64),
    Str(String),
}

/// One anomaly, with the values that explain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbAlert {
    pub event: SMBEvent,
    pub args: Vec<AlertArg>,
}

/// Receiver of SMB alerts. Called synchronously at the end of each
/// `parse_request`/`parse_response` call.
pub trait AlertSink {
    fn alert(&mut self, alert: &SmbAlert);
}

impl SMBState {
    /// Set event.
    pub fn set_event(&mut self, event: SMBEvent) {
        self.set_event_args(event, Vec::new());
    }

    /// Set event with values for the alert.
    pub fn set_event_args(&mut self, event: SMBEvent, args: Vec<AlertArg>) {
        if self.ctx.config.disabled_events.contains(&event) {
            return;
        }
        SCLogDebug!("event {:?} {:?}", event, args);
        self.events.push(SmbAlert { event, args });
    }

    pub(crate) fn flush_events(&mut self, host: &mut dyn SmbHost) {
        for alert in self.events.drain(..) {
            host.alert(&alert);
        }
    }
}
