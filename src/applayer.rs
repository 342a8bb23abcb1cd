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

//! Glue shared by alert producing parsers.

/// Trait implemented by alert enums through `#[derive(AppLayerEvent)]`.
pub trait AppLayerEvent {
    /// Return the enum variant of the given ID.
    fn from_id(id: i32) -> Option<Self>
    where
        Self: std::marker::Sized;

    /// Convert the enum variant to an ID.
    fn as_i32(&self) -> i32;

    /// Return the string name of the enum variant.
    fn to_str(&self) -> &'static str;

    /// Return the enum variant for the given name.
    fn from_string(s: &str) -> Option<Self>
    where
        Self: std::marker::Sized;
}
