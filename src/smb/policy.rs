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

//! Vendor policies: per implementation quirks, AndX chain legality and
//! named pipe lookup rules. Everything here is data, indexed by policy.

use std::fmt;

use crate::smb::smb1::*;
use crate::smb::validate::ByteSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    Win2000,
    WinXP,
    Win2003,
    WinVista,
    Win2008,
    Win7,
    Samba,
    Samba3_0_37,
    Samba3_0_22,
    Samba3_0_20,
}

pub const POLICY_COUNT: usize = 10;

impl Policy {
    pub const ALL: [Policy; POLICY_COUNT] = [
        Policy::Win2000, Policy::WinXP, Policy::Win2003, Policy::WinVista,
        Policy::Win2008, Policy::Win7, Policy::Samba, Policy::Samba3_0_37,
        Policy::Samba3_0_22, Policy::Samba3_0_20,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_samba(self) -> bool {
        matches!(self, Policy::Samba | Policy::Samba3_0_37 |
                Policy::Samba3_0_22 | Policy::Samba3_0_20)
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::Win2000 => "win2000",
            Policy::WinXP => "winxp",
            Policy::Win2003 => "win2003",
            Policy::WinVista => "winvista",
            Policy::Win2008 => "win2008",
            Policy::Win7 => "win7",
            Policy::Samba => "samba",
            Policy::Samba3_0_37 => "samba-3.0.37",
            Policy::Samba3_0_22 => "samba-3.0.22",
            Policy::Samba3_0_20 => "samba-3.0.20",
        }
    }

    pub fn from_name(name: &str) -> Option<Policy> {
        Policy::ALL.iter().copied().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn traits(self) -> &'static PolicyTraits {
        &POLICY_TRAITS[self.index()]
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy::WinXP
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which UID/TID may reach a pipe by its FID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeAccess {
    /// Any UID known to the session, any TID.
    AnyValidUid,
    /// Only the UID that opened the pipe, any TID.
    CreatorUid,
    /// Only the UID and TID that opened the pipe.
    CreatorUidTid,
}

/// Pipe lookup rule before and after the pipe carried its first
/// successful read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeLookupRule {
    pub first_use: PipeAccess,
    pub after_use: PipeAccess,
}

impl PipeLookupRule {
    pub fn access(&self, used: bool) -> PipeAccess {
        if used { self.after_use } else { self.first_use }
    }
}

#[derive(Debug)]
pub struct PolicyTraits {
    pub pipe_lookup: PipeLookupRule,
    /// LogoffAndX invalidates the pipes opened with the UID.
    pub uid_removal_closes_pipes: bool,
    /// A byte count larger than the remaining data is accepted quietly.
    pub bcc_over_remaining_silent: bool,
    /// A Transaction request without bytes is refused.
    pub zero_bcc_trans_is_bad_length: bool,
    /// A bad request phase fragment ends the whole transaction.
    pub trans_error_discards_all: bool,
    /// Secondary requests must come from the primary's UID and TID.
    pub secondary_match_uid_tid: bool,
}

const WIN2000_TRAITS: PolicyTraits = PolicyTraits {
    pipe_lookup: PipeLookupRule {
        first_use: PipeAccess::CreatorUidTid,
        after_use: PipeAccess::AnyValidUid,
    },
    uid_removal_closes_pipes: true,
    bcc_over_remaining_silent: false,
    zero_bcc_trans_is_bad_length: false,
    trans_error_discards_all: false,
    secondary_match_uid_tid: true,
};

const WINDOWS_TRAITS: PolicyTraits = PolicyTraits {
    pipe_lookup: PipeLookupRule {
        first_use: PipeAccess::CreatorUidTid,
        after_use: PipeAccess::CreatorUidTid,
    },
    ..WIN2000_TRAITS
};

const SAMBA_TRAITS: PolicyTraits = PolicyTraits {
    pipe_lookup: PipeLookupRule {
        first_use: PipeAccess::CreatorUid,
        after_use: PipeAccess::CreatorUid,
    },
    uid_removal_closes_pipes: true,
    bcc_over_remaining_silent: false,
    zero_bcc_trans_is_bad_length: true,
    trans_error_discards_all: true,
    secondary_match_uid_tid: false,
};

const SAMBA_LEGACY_TRAITS: PolicyTraits = PolicyTraits {
    pipe_lookup: PipeLookupRule {
        first_use: PipeAccess::AnyValidUid,
        after_use: PipeAccess::AnyValidUid,
    },
    uid_removal_closes_pipes: false,
    bcc_over_remaining_silent: true,
    ..SAMBA_TRAITS
};

/// Indexed by `Policy::index`.
pub static POLICY_TRAITS: [PolicyTraits; POLICY_COUNT] = [
    WIN2000_TRAITS,
    WINDOWS_TRAITS,
    WINDOWS_TRAITS,
    WINDOWS_TRAITS,
    WINDOWS_TRAITS,
    WINDOWS_TRAITS,
    SAMBA_TRAITS,
    SAMBA_TRAITS,
    SAMBA_LEGACY_TRAITS,
    SAMBA_LEGACY_TRAITS,
];

/// AndX commands that can start a chain link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndXClass {
    OpenAndX,
    LockingAndX,
    ReadAndX,
    WriteAndX,
    SessionSetupAndX,
    LogoffAndX,
    TreeConnectAndX,
    NtCreateAndX,
}

pub const ANDX_CLASS_COUNT: usize = 8;

impl AndXClass {
    pub fn from_command(com: u8) -> Option<AndXClass> {
        let class = match com {
            SMB1_COMMAND_OPEN_ANDX => AndXClass::OpenAndX,
            SMB1_COMMAND_LOCKING_ANDX => AndXClass::LockingAndX,
            SMB1_COMMAND_READ_ANDX => AndXClass::ReadAndX,
            SMB1_COMMAND_WRITE_ANDX => AndXClass::WriteAndX,
            SMB1_COMMAND_SESSION_SETUP_ANDX => AndXClass::SessionSetupAndX,
            SMB1_COMMAND_LOGOFF_ANDX => AndXClass::LogoffAndX,
            SMB1_COMMAND_TREE_CONNECT_ANDX => AndXClass::TreeConnectAndX,
            SMB1_COMMAND_NT_CREATE_ANDX => AndXClass::NtCreateAndX,
            _ => { return None; }
        };
        Some(class)
    }
}

/// Commands Windows accepts after each AndX command. Samba accepts
/// anything.
static WINDOWS_CHAINS: [(AndXClass, &[u8]); ANDX_CLASS_COUNT] = [
    (AndXClass::OpenAndX, &[
        SMB1_COMMAND_READ, SMB1_COMMAND_READ_ANDX, SMB1_COMMAND_WRITE,
        SMB1_COMMAND_WRITE_ANDX, SMB1_COMMAND_QUERY_INFORMATION,
        SMB1_COMMAND_IOCTL, SMB1_COMMAND_CLOSE,
    ]),
    (AndXClass::LockingAndX, &[
        SMB1_COMMAND_READ, SMB1_COMMAND_READ_ANDX, SMB1_COMMAND_WRITE,
        SMB1_COMMAND_WRITE_ANDX, SMB1_COMMAND_FLUSH, SMB1_COMMAND_LOCKING_ANDX,
    ]),
    (AndXClass::ReadAndX, &[SMB1_COMMAND_CLOSE]),
    (AndXClass::WriteAndX, &[
        SMB1_COMMAND_READ, SMB1_COMMAND_READ_ANDX, SMB1_COMMAND_LOCK_AND_READ,
        SMB1_COMMAND_WRITE_ANDX, SMB1_COMMAND_CLOSE,
    ]),
    (AndXClass::SessionSetupAndX, &[
        SMB1_COMMAND_TREE_CONNECT_ANDX, SMB1_COMMAND_TREE_CONNECT,
        SMB1_COMMAND_OPEN, SMB1_COMMAND_OPEN_ANDX, SMB1_COMMAND_NT_CREATE_ANDX,
        SMB1_COMMAND_CREATE_DIRECTORY, SMB1_COMMAND_DELETE,
        SMB1_COMMAND_DELETE_DIRECTORY, SMB1_COMMAND_CHECK_DIRECTORY,
        SMB1_COMMAND_QUERY_INFORMATION, SMB1_COMMAND_SET_INFORMATION,
        SMB1_COMMAND_RENAME, SMB1_COMMAND_TRANS,
    ]),
    (AndXClass::LogoffAndX, &[SMB1_COMMAND_SESSION_SETUP_ANDX]),
    (AndXClass::TreeConnectAndX, &[
        SMB1_COMMAND_CHECK_DIRECTORY, SMB1_COMMAND_CREATE_DIRECTORY,
        SMB1_COMMAND_DELETE, SMB1_COMMAND_DELETE_DIRECTORY, SMB1_COMMAND_OPEN,
        SMB1_COMMAND_OPEN_ANDX, SMB1_COMMAND_NT_CREATE_ANDX,
        SMB1_COMMAND_OPEN_PRINT_FILE, SMB1_COMMAND_QUERY_INFORMATION,
        SMB1_COMMAND_QUERY_INFO_DISK, SMB1_COMMAND_RENAME,
        SMB1_COMMAND_SET_INFORMATION, SMB1_COMMAND_TRANS, SMB1_COMMAND_TRANS2,
    ]),
    (AndXClass::NtCreateAndX, &[
        SMB1_COMMAND_READ, SMB1_COMMAND_READ_ANDX, SMB1_COMMAND_WRITE,
        SMB1_COMMAND_WRITE_ANDX, SMB1_COMMAND_QUERY_INFORMATION,
        SMB1_COMMAND_IOCTL, SMB1_COMMAND_CLOSE,
    ]),
];

/// Chain legality cube: policy, current AndX command, next command.
pub struct ChainTable {
    allowed: Box<[[ByteSet; ANDX_CLASS_COUNT]; POLICY_COUNT]>,
}

impl ChainTable {
    pub fn new() -> ChainTable {
        let mut allowed = Box::new([[ByteSet::EMPTY; ANDX_CLASS_COUNT]; POLICY_COUNT]);
        for policy in Policy::ALL {
            let row = &mut allowed[policy.index()];
            if policy.is_samba() {
                *row = [ByteSet::FULL; ANDX_CLASS_COUNT];
                continue;
            }
            for (class, next) in WINDOWS_CHAINS.iter() {
                row[*class as usize] = ByteSet::from_slice(next);
            }
        }
        ChainTable { allowed }
    }

    pub fn is_allowed(&self, policy: Policy, class: AndXClass, next_com: u8) -> bool {
        self.allowed[policy.index()][class as usize].contains(next_com)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_policy_names() {
        for p in Policy::ALL {
            assert_eq!(Policy::from_name(p.name()), Some(p));
            assert_eq!(p.to_string(), p.name());
        }
        assert_eq!(Policy::from_name("WinXP"), Some(Policy::WinXP));
        assert_eq!(Policy::from_name("os2"), None);
        assert_eq!(Policy::ALL.iter().filter(|p| p.is_samba()).count(), 4);
    }

    #[test_case(Policy::Win2000, PipeAccess::CreatorUidTid, PipeAccess::AnyValidUid)]
    #[test_case(Policy::Win7, PipeAccess::CreatorUidTid, PipeAccess::CreatorUidTid)]
    #[test_case(Policy::Samba3_0_37, PipeAccess::CreatorUid, PipeAccess::CreatorUid)]
    #[test_case(Policy::Samba3_0_20, PipeAccess::AnyValidUid, PipeAccess::AnyValidUid)]
    fn test_pipe_lookup(policy: Policy, first: PipeAccess, after: PipeAccess) {
        let rule = policy.traits().pipe_lookup;
        assert_eq!(rule.access(false), first);
        assert_eq!(rule.access(true), after);
    }

    #[test]
    fn test_legacy_samba_uid_removal() {
        for p in Policy::ALL {
            let legacy = p == Policy::Samba3_0_20 || p == Policy::Samba3_0_22;
            assert_eq!(p.traits().uid_removal_closes_pipes, !legacy);
            assert_eq!(p.traits().bcc_over_remaining_silent, legacy);
        }
    }

    #[test_case(Policy::WinXP, AndXClass::NtCreateAndX, SMB1_COMMAND_WRITE_ANDX, true)]
    #[test_case(Policy::WinXP, AndXClass::NtCreateAndX, SMB1_COMMAND_TRANS, false)]
    #[test_case(Policy::Samba, AndXClass::NtCreateAndX, SMB1_COMMAND_TRANS, true)]
    #[test_case(Policy::Win2003, AndXClass::SessionSetupAndX, SMB1_COMMAND_LOGOFF_ANDX, false)]
    #[test_case(Policy::Win2003, AndXClass::SessionSetupAndX, SMB1_COMMAND_TREE_CONNECT_ANDX, true)]
    #[test_case(Policy::Win7, AndXClass::ReadAndX, SMB1_COMMAND_CLOSE, true)]
    #[test_case(Policy::Win7, AndXClass::ReadAndX, SMB1_COMMAND_READ_ANDX, false)]
    #[test_case(Policy::Samba3_0_20, AndXClass::ReadAndX, SMB1_COMMAND_READ_ANDX, true)]
    fn test_chain_table(policy: Policy, class: AndXClass, next: u8, allowed: bool) {
        let t = ChainTable::new();
        assert_eq!(t.is_allowed(policy, class, next), allowed);
    }

    #[test]
    fn test_andx_class() {
        assert_eq!(AndXClass::from_command(SMB1_COMMAND_WRITE_ANDX), Some(AndXClass::WriteAndX));
        assert_eq!(AndXClass::from_command(SMB1_COMMAND_WRITE), None);
    }
}
