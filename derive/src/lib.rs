/* Copyright (C) 2020-2024 Open Information Security Foundation
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

#![deny(warnings)]
#![allow(clippy::uninlined_format_args)]

extern crate proc_macro;

use proc_macro::TokenStream;

mod applayerevent;
mod utils;

/// Derives `dce_smb::applayer::AppLayerEvent` for a fieldless enum.
///
/// Ids follow declaration order. Alert names are the snake_case form of
/// the variant unless `#[name("...")]` overrides it:
///
/// ```ignore
/// #[derive(AppLayerEvent)]
/// pub enum SMBEvent {
///     BadNbssType,              // "bad_nbss_type"
///     #[name("memcap")]
///     MemcapReached,
/// }
/// ```
#[proc_macro_derive(AppLayerEvent, attributes(name))]
pub fn derive_app_layer_event(input: TokenStream) -> TokenStream {
    applayerevent::derive_app_layer_event(input)
}
