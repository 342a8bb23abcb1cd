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

//! SMB1 header and command record parsers.
//!
//! Command parsers take the command block starting at its word count
//! byte. Offsets inside records that point at data (DataOffset,
//! ParameterOffset) are relative to the start of the SMB header.

use crate::smb::error::SmbError;
use crate::smb::smb::*;
use crate::smb::smb_records::*;
use nom7::bytes::streaming::{tag, take};
use nom7::combinator::{cond, rest};
use nom7::number::streaming::{le_u8, le_u16, le_u32};
use nom7::error::ParseError;
use nom7::IResult;

pub const SMB1_HEADER_SIZE: usize = 32;

// SMB_FLAGS_REPLY in Microsoft docs.
const SMB1_FLAGS_RESPONSE: u8 = 0x80;

pub const SMB1_FLAGS2_NT_STATUS: u16 = 0x4000;
pub const SMB1_FLAGS2_UNICODE: u16 = 0x8000;

/// Buffer format byte of a data block.
pub const SMB1_FORMAT_DATA_BLOCK: u8 = 0x01;
/// Buffer format byte of a dialect string.
pub const SMB1_FORMAT_DIALECT: u8 = 0x02;
/// Buffer format byte of an ASCII string.
pub const SMB1_FORMAT_ASCII: u8 = 0x04;

/// ResourceType of a named pipe opened in byte mode.
pub const SMB1_FILE_TYPE_BYTE_MODE_PIPE: u16 = 0x0001;
/// ResourceType of a named pipe opened in message mode.
pub const SMB1_FILE_TYPE_MESSAGE_MODE_PIPE: u16 = 0x0002;

fn smb_get_unicode_string_with_offset(i: &[u8], offset: usize) -> IResult<&[u8], Vec<u8>, SmbError>
{
    let (i, _) = cond(offset % 2 == 1, take(1_usize))(i)?;
    smb_get_unicode_string(i)
}

/// take a string, unicode or ascii based on record. `offset` is the
/// position of `i` relative to the SMB header, unicode strings are
/// aligned on it.
pub fn smb1_get_string<'a>(i: &'a[u8], r: &SmbRecord, offset: usize) -> IResult<&'a[u8], Vec<u8>, SmbError> {
    if r.has_unicode_support() {
        smb_get_unicode_string_with_offset(i, offset)
    } else {
        smb_get_ascii_string(i)
    }
}

/// Trailing string that may be cut short by the end of the block.
pub fn smb1_get_string_lenient<'a>(i: &'a[u8], r: &SmbRecord, offset: usize) -> (&'a[u8], Vec<u8>) {
    if r.has_unicode_support() {
        let i = if offset % 2 == 1 && !i.is_empty() { &i[1..] } else { i };
        smb_get_unicode_string_lenient(i)
    } else {
        smb_get_ascii_string_lenient(i)
    }
}

#[derive(Debug,PartialEq)]
pub struct SmbRecord<'a> {
    pub command: u8,
    pub nt_status: u32,
    pub flags: u8,
    pub flags2: u16,

    pub tree_id: u16,
    pub user_id: u16,
    pub multiplex_id: u16,
    pub process_id: u32,

    pub data: &'a[u8],
}

impl<'a> SmbRecord<'a> {
    pub fn has_unicode_support(&self) -> bool {
        self.flags2 & SMB1_FLAGS2_UNICODE != 0
    }

    /// Status field holds an NT status rather than a DOS error.
    pub fn is_nt_status(&self) -> bool {
        self.flags2 & SMB1_FLAGS2_NT_STATUS != 0
    }

    /// Return true if record is a request.
    pub fn is_request(&self) -> bool {
        self.flags & SMB1_FLAGS_RESPONSE == 0
    }

    /// Return true if record is a reply.
    pub fn is_response(&self) -> bool {
        self.flags & SMB1_FLAGS_RESPONSE != 0
    }

    pub fn dos_class(&self) -> u8 {
        (self.nt_status & 0xff) as u8
    }

    pub fn dos_code(&self) -> u16 {
        (self.nt_status >> 16) as u16
    }

    /// Error severity NT status, or a DOS error other than "more data".
    pub fn is_status_error(&self) -> bool {
        if self.is_nt_status() {
            self.nt_status & SMB_NTSTATUS_SEVERITY_MASK == SMB_NTSTATUS_SEVERITY_ERROR
        } else {
            let class = self.dos_class();
            class != SMB_ERRCLASS_SUCCESS &&
                !(class == SMB_ERRCLASS_DOS && self.dos_code() == SMB_ERRDOS_MOREDATA)
        }
    }

    /// Status matches either the NT status or its DOS equivalent.
    pub fn status_is(&self, nt_status: u32, dos_class: u8, dos_code: u16) -> bool {
        if self.is_nt_status() {
            self.nt_status == nt_status
        } else {
            self.dos_class() == dos_class && self.dos_code() == dos_code
        }
    }
}

pub fn parse_smb_record(i: &[u8]) -> IResult<&[u8], SmbRecord> {
    let (i, _) = tag(b"\xffSMB")(i)?;
    let (i, command) = le_u8(i)?;
    let (i, nt_status) = le_u32(i)?;
    let (i, flags) = le_u8(i)?;
    let (i, flags2) = le_u16(i)?;
    let (i, process_id_high) = le_u16(i)?;
    let (i, _signature) = take(8_usize)(i)?;
    let (i, _reserved) = take(2_usize)(i)?;
    let (i, tree_id) = le_u16(i)?;
    let (i, process_id) = le_u16(i)?;
    let (i, user_id) = le_u16(i)?;
    let (i, multiplex_id) = le_u16(i)?;
    let (i, data) = rest(i)?;

    let record = SmbRecord {
        command,
        nt_status,
        flags,
        flags2,
        tree_id,
        user_id,
        multiplex_id,
        process_id: (process_id_high as u32) << 16 | process_id as u32,
        data,
    };
    Ok((i, record))
}

#[derive(Debug,PartialEq)]
pub struct SmbParamBlockAndXHeader {
    pub wct: u8,
    pub andx_command: u8,
    pub andx_offset: u16,
}

/// Generic over the error type so the string parsers, which fail with
/// `SmbError`, can share it.
pub fn smb1_parse_andx_header<'a, E: ParseError<&'a[u8]>>(i: &'a[u8])
    -> IResult<&'a[u8], SmbParamBlockAndXHeader, E>
{
    let (i, wct) = le_u8(i)?;
    let (i, andx_command) = le_u8(i)?;
    let (i, _) = take(1_usize)(i)?; // reserved
    let (i, andx_offset) = le_u16(i)?;
    let hdr = SmbParamBlockAndXHeader {
        wct,
        andx_command,
        andx_offset,
    };
    Ok((i, hdr))
}

/// FID of commands whose first parameter word is the FID: Close, Read,
/// Write, LockAndRead, WriteAndUnlock, ReadRaw, WriteAndClose.
pub fn parse_smb1_fid_record(i: &[u8]) -> IResult<&[u8], u16> {
    let (i, _wct) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    Ok((i, fid))
}

/// FID of AndX commands: ReadAndX and WriteAndX requests, OpenAndX
/// response.
pub fn parse_smb1_andx_fid_record(i: &[u8]) -> IResult<&[u8], u16> {
    let (i, _hdr) = smb1_parse_andx_header(i)?;
    let (i, fid) = le_u16(i)?;
    Ok((i, fid))
}

/// Core Write and WriteAndUnlock request.
#[derive(Debug,PartialEq)]
pub struct Smb1WriteRequestRecord<'a> {
    pub fid: u16,
    pub count: u16,
    pub bcc: u16,
    pub buffer_format: u8,
    pub data_len: u16,
    /// Data present in the PDU, at most `data_len` bytes.
    pub data: &'a[u8],
}

pub fn parse_smb1_write_request_record(i: &[u8]) -> IResult<&[u8], Smb1WriteRequestRecord> {
    let (i, _wct) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, count) = le_u16(i)?;
    let (i, _offset) = le_u32(i)?;
    let (i, _remaining) = le_u16(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, buffer_format) = le_u8(i)?;
    let (i, data_len) = le_u16(i)?;
    let (i, data) = take(std::cmp::min(data_len as usize, i.len()))(i)?;
    let record = Smb1WriteRequestRecord {
        fid,
        count,
        bcc,
        buffer_format,
        data_len,
        data,
    };
    Ok((i, record))
}

/// Core Read and LockAndRead response.
#[derive(Debug,PartialEq)]
pub struct Smb1ReadResponseRecord<'a> {
    pub count: u16,
    pub bcc: u16,
    pub buffer_format: u8,
    pub data_len: u16,
    pub data: &'a[u8],
}

pub fn parse_smb1_read_response_record(i: &[u8]) -> IResult<&[u8], Smb1ReadResponseRecord> {
    let (i, _wct) = le_u8(i)?;
    let (i, count) = le_u16(i)?;
    let (i, _reserved) = take(8_usize)(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, buffer_format) = le_u8(i)?;
    let (i, data_len) = le_u16(i)?;
    let (i, data) = take(std::cmp::min(data_len as usize, i.len()))(i)?;
    let record = Smb1ReadResponseRecord {
        count,
        bcc,
        buffer_format,
        data_len,
        data,
    };
    Ok((i, record))
}

#[derive(Debug,PartialEq)]
pub struct Smb1WriteAndCloseRequestRecord<'a> {
    pub fid: u16,
    pub count: u16,
    pub bcc: u16,
    pub data: &'a[u8],
}

pub fn parse_smb1_write_and_close_request_record(i: &[u8]) -> IResult<&[u8], Smb1WriteAndCloseRequestRecord> {
    let (i, wct) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, count) = le_u16(i)?;
    let (i, _offset) = le_u32(i)?;
    let (i, _last_write) = le_u32(i)?;
    let (i, _) = cond(wct == 12, take(12_usize))(i)?; // reserved
    let (i, bcc) = le_u16(i)?;
    let (i, _pad) = take(1_usize)(i)?;
    let (i, data) = take(std::cmp::min(count as usize, i.len()))(i)?;
    let record = Smb1WriteAndCloseRequestRecord {
        fid,
        count,
        bcc,
        data,
    };
    Ok((i, record))
}

#[derive(Debug,PartialEq)]
pub struct Smb1WriteAndXRequestRecord {
    pub fid: u16,
    pub write_mode: u16,
    pub remaining: u16,
    pub data_len: u32,
    pub data_offset: u16,
    pub bcc: u16,
}

pub fn parse_smb1_write_andx_request_record(i: &[u8]) -> IResult<&[u8], Smb1WriteAndXRequestRecord> {
    let (i, hdr) = smb1_parse_andx_header(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, _offset) = le_u32(i)?;
    let (i, _timeout) = le_u32(i)?;
    let (i, write_mode) = le_u16(i)?;
    let (i, remaining) = le_u16(i)?;
    let (i, data_len_high) = le_u16(i)?;
    let (i, data_len_low) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, _high_offset) = cond(hdr.wct == 14, le_u32)(i)?;
    let (i, bcc) = le_u16(i)?;
    let record = Smb1WriteAndXRequestRecord {
        fid,
        write_mode,
        remaining,
        data_len: (data_len_high as u32) << 16 | data_len_low as u32,
        data_offset,
        bcc,
    };
    Ok((i, record))
}

#[derive(Debug,PartialEq)]
pub struct Smb1ReadAndXResponseRecord {
    pub data_len: u32,
    pub data_offset: u16,
    pub bcc: u16,
}

pub fn parse_smb1_read_andx_response_record(i: &[u8]) -> IResult<&[u8], Smb1ReadAndXResponseRecord> {
    let (i, _hdr) = smb1_parse_andx_header(i)?;
    let (i, _available) = le_u16(i)?;
    let (i, _compaction_mode) = le_u16(i)?;
    let (i, _reserved) = le_u16(i)?;
    let (i, data_len_low) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, data_len_high) = le_u16(i)?;
    let (i, _reserved) = take(8_usize)(i)?;
    let (i, bcc) = le_u16(i)?;
    let record = Smb1ReadAndXResponseRecord {
        data_len: (data_len_high as u32) << 16 | data_len_low as u32,
        data_offset,
        bcc,
    };
    Ok((i, record))
}

/// Write mode bit asking the server for a WriteComplete.
pub const SMB1_WRITE_MODE_WRITE_THROUGH: u16 = 0x0001;

#[derive(Debug,PartialEq)]
pub struct Smb1WriteRawRequestRecord {
    pub fid: u16,
    pub count: u16,
    pub write_mode: u16,
    pub data_len: u16,
    pub data_offset: u16,
    pub bcc: u16,
}

pub fn parse_smb1_write_raw_request_record(i: &[u8]) -> IResult<&[u8], Smb1WriteRawRequestRecord> {
    let (i, wct) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, count) = le_u16(i)?;
    let (i, _reserved) = le_u16(i)?;
    let (i, _offset) = le_u32(i)?;
    let (i, _timeout) = le_u32(i)?;
    let (i, write_mode) = le_u16(i)?;
    let (i, _reserved2) = le_u32(i)?;
    let (i, data_len) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, _high_offset) = cond(wct == 14, le_u32)(i)?;
    let (i, bcc) = le_u16(i)?;
    let record = Smb1WriteRawRequestRecord {
        fid,
        count,
        write_mode,
        data_len,
        data_offset,
        bcc,
    };
    Ok((i, record))
}

/// FID and ResourceType of a successful open.
#[derive(Debug,PartialEq, Eq, Clone, Copy)]
pub struct Smb1OpenResponseRecord {
    pub fid: u16,
    pub resource_type: u16,
}

impl Smb1OpenResponseRecord {
    pub fn is_byte_mode(&self) -> bool {
        self.resource_type == SMB1_FILE_TYPE_BYTE_MODE_PIPE
    }
}

pub fn parse_smb1_open_andx_response_record(i: &[u8]) -> IResult<&[u8], Smb1OpenResponseRecord> {
    let (i, _hdr) = smb1_parse_andx_header(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, _file_attrs) = le_u16(i)?;
    let (i, _last_write) = le_u32(i)?;
    let (i, _file_size) = le_u32(i)?;
    let (i, _access) = le_u16(i)?;
    let (i, resource_type) = le_u16(i)?;
    Ok((i, Smb1OpenResponseRecord { fid, resource_type }))
}

pub fn parse_smb1_nt_create_andx_response_record(i: &[u8]) -> IResult<&[u8], Smb1OpenResponseRecord> {
    let (i, _hdr) = smb1_parse_andx_header(i)?;
    let (i, _oplock_level) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, _create_action) = le_u32(i)?;
    let (i, _times) = take(32_usize)(i)?;
    let (i, _ext_file_attrs) = le_u32(i)?;
    let (i, _alloc_size) = take(8_usize)(i)?;
    let (i, _eof) = take(8_usize)(i)?;
    let (i, resource_type) = le_u16(i)?;
    Ok((i, Smb1OpenResponseRecord { fid, resource_type }))
}

/// Parameters of Trans2 OPEN2 and NT_TRANSACT_CREATE responses.
pub fn parse_trans2_open2_response_params(i: &[u8]) -> IResult<&[u8], Smb1OpenResponseRecord> {
    let (i, fid) = le_u16(i)?;
    let (i, _file_attrs) = le_u16(i)?;
    let (i, _create_time) = le_u32(i)?;
    let (i, _file_size) = le_u32(i)?;
    let (i, _access) = le_u16(i)?;
    let (i, resource_type) = le_u16(i)?;
    Ok((i, Smb1OpenResponseRecord { fid, resource_type }))
}

pub fn parse_nt_trans_create_response_params(i: &[u8]) -> IResult<&[u8], Smb1OpenResponseRecord> {
    let (i, _oplock_level) = le_u8(i)?;
    let (i, _reserved) = le_u8(i)?;
    let (i, fid) = le_u16(i)?;
    let (i, _create_action) = le_u32(i)?;
    let (i, _ea_error_offset) = le_u32(i)?;
    let (i, _times) = take(32_usize)(i)?;
    let (i, _ext_file_attrs) = le_u32(i)?;
    let (i, _alloc_size) = take(8_usize)(i)?;
    let (i, _eof) = take(8_usize)(i)?;
    let (i, resource_type) = le_u16(i)?;
    Ok((i, Smb1OpenResponseRecord { fid, resource_type }))
}

/// One fragment of a Transaction, Transaction2 or NtTransact exchange.
/// Primary requests, secondary requests and responses all map here.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SmbTransFragment {
    pub total_param_cnt: u32,
    pub total_data_cnt: u32,
    pub param_cnt: u32,
    pub param_offset: u32,
    pub param_disp: u32,
    pub data_cnt: u32,
    pub data_offset: u32,
    pub data_disp: u32,
    pub setup_cnt: u8,
    /// Transaction flags, primary Transaction and Transaction2 requests.
    pub flags: u16,
    /// First setup word, or the NtTransact function.
    pub subcom: u16,
}

pub const SMB1_TRANS_FLAGS_DISCONNECT_TID: u16 = 0x0001;
pub const SMB1_TRANS_FLAGS_NO_RESPONSE: u16 = 0x0002;

/// Primary Transaction and Transaction2 request.
pub fn parse_smb1_trans_request_record(i: &[u8]) -> IResult<&[u8], SmbTransFragment> {
    let (i, _wct) = le_u8(i)?;
    let (i, total_param_cnt) = le_u16(i)?;
    let (i, total_data_cnt) = le_u16(i)?;
    let (i, _max_param_cnt) = le_u16(i)?;
    let (i, _max_data_cnt) = le_u16(i)?;
    let (i, _max_setup_cnt) = le_u8(i)?;
    let (i, _) = take(1_usize)(i)?; // reserved
    let (i, flags) = le_u16(i)?;
    let (i, _timeout) = le_u32(i)?;
    let (i, _) = take(2_usize)(i)?; // reserved
    let (i, param_cnt) = le_u16(i)?;
    let (i, param_offset) = le_u16(i)?;
    let (i, data_cnt) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, setup_cnt) = le_u8(i)?;
    let (i, _) = take(1_usize)(i)?; // reserved
    let (i, subcom) = cond(setup_cnt > 0, le_u16)(i)?;
    let frag = SmbTransFragment {
        total_param_cnt: total_param_cnt as u32,
        total_data_cnt: total_data_cnt as u32,
        param_cnt: param_cnt as u32,
        param_offset: param_offset as u32,
        param_disp: 0,
        data_cnt: data_cnt as u32,
        data_offset: data_offset as u32,
        data_disp: 0,
        setup_cnt,
        flags,
        subcom: subcom.unwrap_or(0),
    };
    Ok((i, frag))
}

/// Transaction and Transaction2 secondary request.
pub fn parse_smb1_trans_secondary_record(i: &[u8]) -> IResult<&[u8], SmbTransFragment> {
    let (i, _wct) = le_u8(i)?;
    let (i, total_param_cnt) = le_u16(i)?;
    let (i, total_data_cnt) = le_u16(i)?;
    let (i, param_cnt) = le_u16(i)?;
    let (i, param_offset) = le_u16(i)?;
    let (i, param_disp) = le_u16(i)?;
    let (i, data_cnt) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, data_disp) = le_u16(i)?;
    let frag = SmbTransFragment {
        total_param_cnt: total_param_cnt as u32,
        total_data_cnt: total_data_cnt as u32,
        param_cnt: param_cnt as u32,
        param_offset: param_offset as u32,
        param_disp: param_disp as u32,
        data_cnt: data_cnt as u32,
        data_offset: data_offset as u32,
        data_disp: data_disp as u32,
        ..Default::default()
    };
    Ok((i, frag))
}

/// Transaction and Transaction2 response.
pub fn parse_smb1_trans_response_record(i: &[u8]) -> IResult<&[u8], SmbTransFragment> {
    let (i, _wct) = le_u8(i)?;
    let (i, total_param_cnt) = le_u16(i)?;
    let (i, total_data_cnt) = le_u16(i)?;
    let (i, _) = take(2_usize)(i)?; // reserved
    let (i, param_cnt) = le_u16(i)?;
    let (i, param_offset) = le_u16(i)?;
    let (i, param_disp) = le_u16(i)?;
    let (i, data_cnt) = le_u16(i)?;
    let (i, data_offset) = le_u16(i)?;
    let (i, data_disp) = le_u16(i)?;
    let (i, setup_cnt) = le_u8(i)?;
    let frag = SmbTransFragment {
        total_param_cnt: total_param_cnt as u32,
        total_data_cnt: total_data_cnt as u32,
        param_cnt: param_cnt as u32,
        param_offset: param_offset as u32,
        param_disp: param_disp as u32,
        data_cnt: data_cnt as u32,
        data_offset: data_offset as u32,
        data_disp: data_disp as u32,
        setup_cnt,
        ..Default::default()
    };
    Ok((i, frag))
}

/// Primary NtTransact request.
pub fn parse_smb1_nt_trans_request_record(i: &[u8]) -> IResult<&[u8], SmbTransFragment> {
    let (i, _wct) = le_u8(i)?;
    let (i, _max_setup_cnt) = le_u8(i)?;
    let (i, _) = take(2_usize)(i)?; // reserved
    let (i, total_param_cnt) = le_u32(i)?;
    let (i, total_data_cnt) = le_u32(i)?;
    let (i, _max_param_cnt) = le_u32(i)?;
    let (i, _max_data_cnt) = le_u32(i)?;
    let (i, param_cnt) = le_u32(i)?;
    let (i, param_offset) = le_u32(i)?;
    let (i, data_cnt) = le_u32(i)?;
    let (i, data_offset) = le_u32(i)?;
    let (i, setup_cnt) = le_u8(i)?;
    let (i, function) = le_u16(i)?;
    let frag = SmbTransFragment {
        total_param_cnt,
        total_data_cnt,
        param_cnt,
        param_offset,
        param_disp: 0,
        data_cnt,
        data_offset,
        data_disp: 0,
        setup_cnt,
        flags: 0,
        subcom: function,
    };
    Ok((i, frag))
}

/// NtTransact secondary request and NtTransact response share a layout,
/// the response adds the setup count.
pub fn parse_smb1_nt_trans_secondary_record(i: &[u8]) -> IResult<&[u8], SmbTransFragment> {
    let (i, wct) = le_u8(i)?;
    let (i, _) = take(3_usize)(i)?; // reserved
    let (i, total_param_cnt) = le_u32(i)?;
    let (i, total_data_cnt) = le_u32(i)?;
    let (i, param_cnt) = le_u32(i)?;
    let (i, param_offset) = le_u32(i)?;
    let (i, param_disp) = le_u32(i)?;
    let (i, data_cnt) = le_u32(i)?;
    let (i, data_offset) = le_u32(i)?;
    let (i, data_disp) = le_u32(i)?;
    let (i, setup_cnt) = cond(wct >= 18, le_u8)(i)?;
    let frag = SmbTransFragment {
        total_param_cnt,
        total_data_cnt,
        param_cnt,
        param_offset,
        param_disp,
        data_cnt,
        data_offset,
        data_disp,
        setup_cnt: setup_cnt.unwrap_or(0),
        ..Default::default()
    };
    Ok((i, frag))
}

/// Dialect strings of a Negotiate request.
#[derive(Debug,PartialEq)]
pub struct Smb1NegotiateProtocolRecord<'a> {
    pub dialects: Vec<(u8, &'a[u8])>,
}

pub fn parse_smb1_negotiate_protocol_record(i: &[u8]) -> IResult<&[u8], Smb1NegotiateProtocolRecord> {
    let (i, _wct) = le_u8(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, mut blob) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
    let mut dialects = Vec::new();
    while !blob.is_empty() {
        let format = blob[0];
        let s = &blob[1..];
        let end = s.iter().position(|&c| c == 0).unwrap_or(s.len());
        dialects.push((format, &s[..end]));
        blob = &s[std::cmp::min(end + 1, s.len())..];
    }
    Ok((i, Smb1NegotiateProtocolRecord { dialects }))
}

#[derive(Debug,PartialEq)]
pub struct Smb1NegotiateProtocolResponseRecord {
    pub dialect_idx: u16,
    pub max_mpx_count: Option<u16>,
}

pub fn parse_smb1_negotiate_protocol_response_record(i: &[u8]) -> IResult<&[u8], Smb1NegotiateProtocolResponseRecord> {
    let (i, wct) = le_u8(i)?;
    let (i, dialect_idx) = le_u16(i)?;
    let (i, max_mpx_count) = match wct {
        17 => {
            let (i, _security_mode) = le_u8(i)?;
            let (i, mpx) = le_u16(i)?;
            (i, Some(mpx))
        }
        13 => {
            let (i, _security_mode) = le_u16(i)?;
            let (i, _max_buffer_size) = le_u16(i)?;
            let (i, mpx) = le_u16(i)?;
            (i, Some(mpx))
        }
        _ => (i, None),
    };
    let record = Smb1NegotiateProtocolResponseRecord {
        dialect_idx,
        max_mpx_count,
    };
    Ok((i, record))
}

/// Native OS and LAN manager strings of a SessionSetupAndX exchange.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SmbNativeInfo {
    pub native_os: Vec<u8>,
    pub native_lm: Vec<u8>,
}

fn parse_native_strings<'a>(i: &'a[u8], r: &SmbRecord, offset: usize) -> SmbNativeInfo {
    let (rem, native_os) = smb1_get_string_lenient(i, r, offset);
    let offset = offset + (i.len() - rem.len());
    let (_, native_lm) = smb1_get_string_lenient(rem, r, offset);
    SmbNativeInfo { native_os, native_lm }
}

/// SessionSetupAndX request native strings. `offset` is the position
/// of the command block relative to the SMB header.
pub fn parse_smb1_session_setup_request_native<'a>(i: &'a[u8], r: &SmbRecord, offset: usize)
    -> IResult<&'a[u8], SmbNativeInfo, SmbError>
{
    let (i, hdr) = smb1_parse_andx_header(i)?;
    let (i, bytes, strings_at) = match hdr.wct {
        13 => {
            let (i, _) = take(10_usize)(i)?;
            let (i, oem_pw_len) = le_u16(i)?;
            let (i, uni_pw_len) = le_u16(i)?;
            let (i, _) = take(8_usize)(i)?;
            let (i, bcc) = le_u16(i)?;
            let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
            (i, bytes, oem_pw_len as usize + uni_pw_len as usize)
        }
        12 => {
            let (i, _) = take(10_usize)(i)?;
            let (i, blob_len) = le_u16(i)?;
            let (i, _) = take(8_usize)(i)?;
            let (i, bcc) = le_u16(i)?;
            let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
            (i, bytes, blob_len as usize)
        }
        _ => {
            let (i, _) = take(10_usize)(i)?;
            let (i, pw_len) = le_u16(i)?;
            let (i, _) = take(4_usize)(i)?;
            let (i, bcc) = le_u16(i)?;
            let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
            (i, bytes, pw_len as usize)
        }
    };
    let bytes_offset = offset + 3 + 2 * hdr.wct as usize;
    if strings_at > bytes.len() {
        return Ok((i, SmbNativeInfo::default()));
    }
    let mut cur = &bytes[strings_at..];
    let mut cur_offset = bytes_offset + strings_at;
    if hdr.wct == 13 {
        // account and primary domain come first
        for _ in 0..2 {
            let (rem, _) = smb1_get_string_lenient(cur, r, cur_offset);
            cur_offset += cur.len() - rem.len();
            cur = rem;
        }
    }
    Ok((i, parse_native_strings(cur, r, cur_offset)))
}

/// SessionSetupAndX response native strings.
pub fn parse_smb1_session_setup_response_native<'a>(i: &'a[u8], r: &SmbRecord, offset: usize)
    -> IResult<&'a[u8], SmbNativeInfo, SmbError>
{
    let (i, hdr) = smb1_parse_andx_header(i)?;
    let (i, _action) = le_u16(i)?;
    let (i, blob_len) = cond(hdr.wct == 4, le_u16)(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
    let skip = blob_len.unwrap_or(0) as usize;
    if skip > bytes.len() {
        return Ok((i, SmbNativeInfo::default()));
    }
    let bytes_offset = offset + 3 + 2 * hdr.wct as usize + skip;
    Ok((i, parse_native_strings(&bytes[skip..], r, bytes_offset)))
}

#[derive(Debug,PartialEq)]
pub struct SmbRecordTreeConnectAndX<'a> {
    pub path: Vec<u8>,
    pub service: &'a[u8],
}

/// TreeConnectAndX request. `offset` is the position of the command
/// block relative to the SMB header.
pub fn parse_smb_connect_tree_andx_record<'a>(i: &'a[u8], r: &SmbRecord, offset: usize)
    -> IResult<&'a[u8], SmbRecordTreeConnectAndX<'a>, SmbError>
{
    let (i, _hdr) = smb1_parse_andx_header(i)?;
    let (i, _flags) = le_u16(i)?;
    let (i, pwlen) = le_u16(i)?;
    let (i, _bcc) = le_u16(i)?;
    let (i, _pw) = take(pwlen)(i)?;
    let (i, path) = smb1_get_string(i, r, offset + 11 + pwlen as usize)?;
    let (i, service) = take(i.iter().position(|&c| c == 0).unwrap_or(i.len()))(i)?;
    let record = SmbRecordTreeConnectAndX {
        path,
        service
    };
    Ok((i, record))
}

/// Service string of a TreeConnectAndX response.
pub fn parse_smb_connect_tree_andx_response_record(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, hdr) = smb1_parse_andx_header(i)?;
    let (i, _) = take((2 * hdr.wct as usize).saturating_sub(4))(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    Ok((i, &bytes[..end]))
}

/// Path of a core TreeConnect request.
pub fn parse_smb_connect_tree_record(i: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (i, _wct) = le_u8(i)?;
    let (i, bcc) = le_u16(i)?;
    let (i, bytes) = take(std::cmp::min(bcc as usize, i.len()))(i)?;
    let (blob, format) = le_u8(bytes)?;
    let end = blob.iter().position(|&c| c == 0).unwrap_or(blob.len());
    Ok((i, (format, &blob[..end])))
}

/// TID of a core TreeConnect response.
pub fn parse_smb_connect_tree_response_record(i: &[u8]) -> IResult<&[u8], u16> {
    let (i, _wct) = le_u8(i)?;
    let (i, _max_buffer_size) = le_u16(i)?;
    let (i, tid) = le_u16(i)?;
    Ok((i, tid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(command: u8, flags: u8, flags2: u16, status: u32) -> Vec<u8> {
        let mut h = b"\xffSMB".to_vec();
        h.push(command);
        h.extend_from_slice(&status.to_le_bytes());
        h.push(flags);
        h.extend_from_slice(&flags2.to_le_bytes());
        h.extend_from_slice(&[0x01, 0x00]); // pid high
        h.extend_from_slice(&[0; 10]);
        h.extend_from_slice(&[0x05, 0x00]); // tid
        h.extend_from_slice(&[0x34, 0x12]); // pid
        h.extend_from_slice(&[0x64, 0x00]); // uid
        h.extend_from_slice(&[0x07, 0x00]); // mid
        h
    }

    #[test]
    fn test_parse_smb_record() {
        let buf = header(0x2f, 0x80, SMB1_FLAGS2_NT_STATUS, SMB_NTSTATUS_PIPE_BROKEN);
        let (_, r) = parse_smb_record(&buf).unwrap();
        assert_eq!(r.command, 0x2f);
        assert_eq!(r.process_id, 0x11234);
        assert_eq!(r.tree_id, 5);
        assert_eq!(r.user_id, 100);
        assert_eq!(r.multiplex_id, 7);
        assert!(r.is_response());
        assert!(r.is_status_error());
        assert!(r.status_is(SMB_NTSTATUS_PIPE_BROKEN, SMB_ERRCLASS_DOS, SMB_ERRDOS_BADPIPE));
        assert!(r.data.is_empty());
    }

    #[test]
    fn test_dos_status() {
        // ERRDOS / ERRmoredata is not an error
        let buf = header(0x25, 0x80, 0, 0x00ea_0001);
        let (_, r) = parse_smb_record(&buf).unwrap();
        assert!(!r.is_nt_status());
        assert_eq!(r.dos_class(), SMB_ERRCLASS_DOS);
        assert_eq!(r.dos_code(), SMB_ERRDOS_MOREDATA);
        assert!(!r.is_status_error());

        let buf = header(0x25, 0x80, 0, 0x00e6_0001);
        let (_, r) = parse_smb_record(&buf).unwrap();
        assert!(r.is_status_error());
        assert!(r.status_is(SMB_NTSTATUS_PIPE_BROKEN, SMB_ERRCLASS_DOS, SMB_ERRDOS_BADPIPE));

        // warning severity is not an error
        let buf = header(0x25, 0x80, SMB1_FLAGS2_NT_STATUS, SMB_NTSTATUS_BUFFER_OVERFLOW);
        let (_, r) = parse_smb_record(&buf).unwrap();
        assert!(!r.is_status_error());
    }

    #[test]
    fn test_parse_negotiate_request() {
        let buf = b"\x00\x24\x00\x02PC NETWORK PROGRAM 1.0\x00\x02NT LM 0.12\x00";
        let (_, r) = parse_smb1_negotiate_protocol_record(buf).unwrap();
        assert_eq!(r.dialects.len(), 2);
        assert_eq!(r.dialects[1], (0x02, &b"NT LM 0.12"[..]));

        // byte count covers the first dialect only
        let buf = b"\x00\x18\x00\x02PC NETWORK PROGRAM 1.0\x00\x02NT LM 0.12\x00";
        let (_, r) = parse_smb1_negotiate_protocol_record(buf).unwrap();
        assert_eq!(r.dialects.len(), 1);
    }

    #[test]
    fn test_parse_write_request() {
        let mut buf = vec![0x05, 0x00, 0x40, 0x04, 0x00];
        buf.extend_from_slice(&[0; 6]);
        buf.extend_from_slice(&[0x07, 0x00, 0x01, 0x04, 0x00]);
        buf.extend_from_slice(b"abc");
        let (_, r) = parse_smb1_write_request_record(&buf).unwrap();
        assert_eq!(r.fid, 0x4000);
        assert_eq!(r.buffer_format, SMB1_FORMAT_DATA_BLOCK);
        assert_eq!(r.data_len, 4);
        assert_eq!(r.data, b"abc");
    }

    #[test]
    fn test_parse_session_setup_response_native() {
        let hdr = header(0x73, 0x80, 0, 0);
        let (_, r) = parse_smb_record(&hdr).unwrap();
        let mut com = vec![0x03, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00];
        let strings = b"Windows 5.1\x00Windows 2000 LAN Manager\x00";
        com.extend_from_slice(&(strings.len() as u16).to_le_bytes());
        com.extend_from_slice(strings);
        let (_, n) = parse_smb1_session_setup_response_native(&com, &r, 32).unwrap();
        assert_eq!(n.native_os, b"Windows 5.1");
        assert_eq!(n.native_lm, b"Windows 2000 LAN Manager");
    }

    #[test]
    fn test_parse_tree_connect_andx_record() {
        let hdr = header(0x75, 0, 0, 0);
        let (_, r) = parse_smb_record(&hdr).unwrap();
        let mut com = vec![0x04, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00];
        let bytes = b"\x00\\\\SRV\\IPC$\x00?????\x00";
        com.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        com.extend_from_slice(bytes);
        let (_, tc) = parse_smb_connect_tree_andx_record(&com, &r, 32).unwrap();
        assert_eq!(tc.path, b"\\\\SRV\\IPC$");
        assert_eq!(tc.service, b"?????");

        // cut inside the andx header
        assert!(parse_smb_connect_tree_andx_record(&com[..3], &r, 32).is_err());
    }

    #[test]
    fn test_parse_trans_request() {
        let mut com = vec![16];
        for v in [0u16, 72, 0, 1024] {
            com.extend_from_slice(&v.to_le_bytes());
        }
        com.extend_from_slice(&[0, 0, 0x02, 0x00, 0, 0, 0, 0, 0, 0]);
        for v in [0u16, 84, 72, 84] {
            com.extend_from_slice(&v.to_le_bytes());
        }
        com.extend_from_slice(&[2, 0, 0x26, 0x00, 0x00, 0x40]);
        let (_, f) = parse_smb1_trans_request_record(&com).unwrap();
        assert_eq!(f.total_data_cnt, 72);
        assert_eq!(f.data_cnt, 72);
        assert_eq!(f.data_offset, 84);
        assert_eq!(f.setup_cnt, 2);
        assert_eq!(f.subcom, 0x26);
        assert_eq!(f.flags, SMB1_TRANS_FLAGS_NO_RESPONSE);
    }
}
