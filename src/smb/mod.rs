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

//! SMB1 transport for DCE/RPC over named pipes.
//!
//! Byte streams enter through `SMBState::parse_request` and
//! `SMBState::parse_response`. NetBIOS frames are validated and
//! reassembled, SMB commands are validated and walked through their AndX
//! chains, and named pipe payloads are handed to a DCE/RPC interpreter.

pub mod error;
pub mod smb_records;
pub mod smb1_records;
pub mod nbss_records;

pub mod smb;
pub mod segment;
pub mod validate;
pub mod policy;
pub mod fingerprint;
pub mod session;
pub mod trans;
pub mod smb1;
pub mod smb1_session;
pub mod smb1_trans;
pub mod dcerpc;
pub mod events;
