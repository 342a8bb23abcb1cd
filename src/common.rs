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

//! Utility library module for commonly used parser helpers.

pub mod nom7 {
    use nom7::bytes::streaming::{tag, take_until};
    use nom7::error::ParseError;
    use nom7::IResult;

    /// Reimplementation of `take_until_and_consume` for nom 7
    ///
    /// `take_until` does not consume the matched tag, and
    /// `take_until_and_consume` was removed in nom 7. This function
    /// provides an implementation (specialized for `&[u8]`).
    pub fn take_until_and_consume<'a, E: ParseError<&'a [u8]>>(
        t: &'a [u8],
    ) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], &'a [u8], E> {
        move |i: &'a [u8]| {
            let (i, res) = take_until(t)(i)?;
            let (i, _) = tag(t)(i)?;
            Ok((i, res))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::nom7::take_until_and_consume;
    use nom7::error::Error;

    #[test]
    fn test_take_until_and_consume() {
        let r = take_until_and_consume::<Error<&[u8]>>(b"\x00")(b"IPC\x00rest");
        assert_eq!(r, Ok((&b"rest"[..], &b"IPC"[..])));
        let r = take_until_and_consume::<Error<&[u8]>>(b"\x00")(b"IPC");
        assert!(r.is_err());
    }
}
