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

//! Peer implementation fingerprinting from the SessionSetupAndX native
//! OS and LAN manager strings.

use crate::smb::policy::Policy;
use crate::smb::smb1_records::SmbNativeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpNext {
    State(u8),
    Found(Policy),
    Fail,
}

/// One row of the Windows native OS state machine. A mismatch moves to
/// `on_fail` and tests the same input character there.
#[derive(Debug, Clone, Copy)]
pub struct FpTransition {
    pub state: u8,
    pub input: u8,
    pub on_match: FpNext,
    pub on_fail: FpNext,
}

const fn t(state: u8, input: u8, on_match: FpNext, on_fail: FpNext) -> FpTransition {
    FpTransition { state, input, on_match, on_fail }
}

use FpNext::{Fail, Found, State};

/// Recognizes "Windows 5.0", "Windows 5.1", "Windows 5.2", "Windows 6.0",
/// "Windows 6.1", "Windows Vista", "Windows 7", "Windows Server 2003",
/// "Windows Server 2008", "Windows Server (R) 2008", "Windows 2000" and
/// "Windows 2002".
pub static WINDOWS_OS_FSM: [FpTransition; 40] = [
    t(0, b'W', State(1), Fail),
    t(1, b'i', State(2), Fail),
    t(2, b'n', State(3), Fail),
    t(3, b'd', State(4), Fail),
    t(4, b'o', State(5), Fail),
    t(5, b'w', State(6), Fail),
    t(6, b's', State(7), Fail),
    t(7, b' ', State(8), Fail),
    t(8, b'5', State(9), State(13)),
    t(9, b'.', State(10), Fail),
    t(10, b'0', Found(Policy::Win2000), State(11)),
    t(11, b'1', Found(Policy::WinXP), State(12)),
    t(12, b'2', Found(Policy::Win2003), Fail),
    t(13, b'6', State(14), State(17)),
    t(14, b'.', State(15), Fail),
    t(15, b'0', Found(Policy::WinVista), State(16)),
    t(16, b'1', Found(Policy::Win7), Fail),
    t(17, b'V', Found(Policy::WinVista), State(18)),
    t(18, b'7', Found(Policy::Win7), State(19)),
    t(19, b'S', State(20), State(35)),
    t(20, b'e', State(21), Fail),
    t(21, b'r', State(22), Fail),
    t(22, b'v', State(23), Fail),
    t(23, b'e', State(24), Fail),
    t(24, b'r', State(25), Fail),
    t(25, b' ', State(26), Fail),
    t(26, b'(', State(27), State(30)),
    t(27, b'R', State(28), Fail),
    t(28, b')', State(29), Fail),
    t(29, b' ', State(30), Fail),
    t(30, b'2', State(31), Fail),
    t(31, b'0', State(32), Fail),
    t(32, b'0', State(33), Fail),
    t(33, b'3', Found(Policy::Win2003), State(34)),
    t(34, b'8', Found(Policy::Win2008), Fail),
    t(35, b'2', State(36), Fail),
    t(36, b'0', State(37), Fail),
    t(37, b'0', State(38), Fail),
    t(38, b'0', Found(Policy::Win2000), State(39)),
    t(39, b'2', Found(Policy::WinXP), Fail),
];

/// Run the Windows state machine over `s`.
pub fn fp_windows(s: &[u8]) -> Option<Policy> {
    let mut state = 0u8;
    let mut pos = 0;
    loop {
        let tr = WINDOWS_OS_FSM.get(state as usize)?;
        debug_validate_bug_on!(tr.state != state);
        let c = *s.get(pos)?;
        let next = if c == tr.input {
            pos += 1;
            tr.on_match
        } else {
            tr.on_fail
        };
        match next {
            State(n) => { state = n; }
            Found(p) => { return Some(p); }
            Fail => { return None; }
        }
    }
}

fn parse_version_part(s: &[u8]) -> Option<(u32, &[u8])> {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let v = std::str::from_utf8(&s[..end]).ok()?.parse().ok()?;
    Some((v, &s[end..]))
}

/// Samba version tier from a "Samba x.y.z" LAN manager string.
pub fn fp_samba_version(native_lm: &[u8]) -> Policy {
    let v = match native_lm.strip_prefix(b"Samba") {
        Some(v) => v,
        None => { return Policy::Samba; }
    };
    let v = v.strip_prefix(b" ").unwrap_or(v);
    let (major, rest) = match parse_version_part(v) {
        Some(r) => r,
        None => { return Policy::Samba; }
    };
    if major < 3 {
        return Policy::Samba3_0_20;
    }
    if major > 3 {
        return Policy::Samba;
    }
    let minor = rest.strip_prefix(b".").and_then(parse_version_part);
    let (minor, rest) = match minor {
        Some(r) => r,
        None => { return Policy::Samba; }
    };
    if minor != 0 {
        return Policy::Samba;
    }
    match rest.strip_prefix(b".").and_then(parse_version_part) {
        Some((patch, _)) if patch <= 20 => Policy::Samba3_0_20,
        Some((patch, _)) if patch <= 22 => Policy::Samba3_0_22,
        Some((patch, _)) if patch <= 37 => Policy::Samba3_0_37,
        _ => Policy::Samba,
    }
}

/// Classify a peer. Windows is tried first, then Samba by a "Unix"
/// native OS or a "Samba" LAN manager.
pub fn fingerprint(info: &SmbNativeInfo) -> Option<Policy> {
    if let Some(p) = fp_windows(&info.native_os) {
        return Some(p);
    }
    if info.native_os.starts_with(b"Unix") || info.native_lm.starts_with(b"Samba") {
        return Some(fp_samba_version(&info.native_lm));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_fsm_rows_are_indexed_by_state() {
        for (i, tr) in WINDOWS_OS_FSM.iter().enumerate() {
            assert_eq!(tr.state as usize, i);
        }
    }

    #[test_case(b"Windows 5.0", Some(Policy::Win2000))]
    #[test_case(b"Windows 5.1", Some(Policy::WinXP))]
    #[test_case(b"Windows 5.2", Some(Policy::Win2003))]
    #[test_case(b"Windows 6.0", Some(Policy::WinVista))]
    #[test_case(b"Windows 6.1", Some(Policy::Win7))]
    #[test_case(b"Windows Vista (TM) Ultimate 6000", Some(Policy::WinVista))]
    #[test_case(b"Windows 7 Professional 7601 Service Pack 1", Some(Policy::Win7))]
    #[test_case(b"Windows Server 2003 3790 Service Pack 2", Some(Policy::Win2003))]
    #[test_case(b"Windows Server 2008 R2 Enterprise 7600", Some(Policy::Win2008))]
    #[test_case(b"Windows Server (R) 2008 Standard 6001", Some(Policy::Win2008))]
    #[test_case(b"Windows 2000 2195", Some(Policy::Win2000))]
    #[test_case(b"Windows 2002 Service Pack 2", Some(Policy::WinXP))]
    #[test_case(b"Windows 4.0", None)]
    #[test_case(b"Windows Server 2012", None)]
    #[test_case(b"Windows", None)]
    #[test_case(b"Unix", None)]
    fn test_fp_windows(os: &[u8], policy: Option<Policy>) {
        assert_eq!(fp_windows(os), policy);
    }

    #[test_case(b"Samba 2.2.8a", Policy::Samba3_0_20)]
    #[test_case(b"Samba 3.0.14a", Policy::Samba3_0_20)]
    #[test_case(b"Samba 3.0.20", Policy::Samba3_0_20)]
    #[test_case(b"Samba 3.0.22", Policy::Samba3_0_22)]
    #[test_case(b"Samba 3.0.28a", Policy::Samba3_0_37)]
    #[test_case(b"Samba 3.0.37", Policy::Samba3_0_37)]
    #[test_case(b"Samba 3.2.5", Policy::Samba)]
    #[test_case(b"Samba 4.3.11-Ubuntu", Policy::Samba)]
    #[test_case(b"Samba", Policy::Samba)]
    fn test_fp_samba_version(lm: &[u8], policy: Policy) {
        assert_eq!(fp_samba_version(lm), policy);
    }

    #[test]
    fn test_fingerprint() {
        let info = SmbNativeInfo {
            native_os: b"Unix".to_vec(),
            native_lm: b"Samba 3.0.22".to_vec(),
        };
        assert_eq!(fingerprint(&info), Some(Policy::Samba3_0_22));
        let info = SmbNativeInfo {
            native_os: b"Windows 5.1".to_vec(),
            native_lm: b"Windows 2000 LAN Manager".to_vec(),
        };
        assert_eq!(fingerprint(&info), Some(Policy::WinXP));
        assert_eq!(fingerprint(&SmbNativeInfo::default()), None);
    }
}
