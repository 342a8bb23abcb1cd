/* Copyright (C) 2021 Open Information Security Foundation
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

/// Path of the runtime crate as seen from the expansion site: `crate`
/// inside dce-smb itself, `dce_smb` anywhere else.
pub fn crate_id() -> syn::Ident {
    let is_self = std::env::var("CARGO_PKG_NAME")
        .map(|var| var == "dce-smb")
        .unwrap_or(false);
    if is_self {
        syn::Ident::new("crate", proc_macro2::Span::call_site())
    } else {
        syn::Ident::new("dce_smb", proc_macro2::Span::call_site())
    }
}

/// Alert name for a variant: "NbLtSmbHdr" becomes "nb_lt_smb_hdr".
/// Runs of capitals stay together, so "ABCName" is "abc_name".
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        let boundary = c.is_uppercase()
            && i > 0
            && match chars.get(i + 1) {
                Some(next) => chars[i - 1].is_lowercase() || next.is_lowercase(),
                None => false,
            };
        if boundary {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}
