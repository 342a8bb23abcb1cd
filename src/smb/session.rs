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

//! Session identifiers: UIDs, TIDs, named pipe trackers and outstanding
//! request trackers.

use std::collections::{HashMap, VecDeque};

use crate::smb::dcerpc::CoTracker;
use crate::smb::events::*;
use crate::smb::policy::PipeAccess;
use crate::smb::smb::*;
use crate::smb::smb1::*;
use crate::smb::smb1_records::SmbRecord;
use crate::smb::trans::TransTracker;

/// Map of 16 bit ids with one slot that needs no allocation. Sessions
/// rarely have more than one UID or TID.
#[derive(Debug)]
pub struct IdMap<V> {
    first: Option<(u16, V)>,
    rest: HashMap<u16, V>,
}

impl<V> Default for IdMap<V> {
    fn default() -> Self {
        IdMap { first: None, rest: HashMap::new() }
    }
}

impl<V> IdMap<V> {
    pub fn insert(&mut self, id: u16, value: V) {
        if let Some((fid, v)) = &mut self.first {
            if *fid == id {
                *v = value;
            } else {
                self.rest.insert(id, value);
            }
            return;
        }
        if self.rest.contains_key(&id) {
            self.rest.insert(id, value);
        } else {
            self.first = Some((id, value));
        }
    }

    pub fn get(&self, id: u16) -> Option<&V> {
        match &self.first {
            Some((fid, v)) if *fid == id => Some(v),
            _ => self.rest.get(&id),
        }
    }

    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: u16) -> Option<V> {
        if matches!(&self.first, Some((fid, _)) if *fid == id) {
            return self.first.take().map(|(_, v)| v);
        }
        self.rest.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.first.is_some() as usize + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index of a pipe tracker in the session's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId(usize);

#[derive(Debug)]
pub struct PipeTracker {
    pub uid: u16,
    pub tid: u16,
    /// Unknown while the open is still outstanding.
    pub fid: Option<u16>,
    pub byte_mode: bool,
    /// Carried a successful read, write or transaction.
    pub used: bool,
    pub co_tracker: CoTracker,
}

/// Owner of the session's pipe trackers. Removal frees the slot, ids
/// held elsewhere must be swept by the caller.
#[derive(Debug, Default)]
pub struct PipeArena {
    slots: Vec<Option<PipeTracker>>,
    free: Vec<usize>,
    count: usize,
}

impl PipeArena {
    pub fn insert(&mut self, pipe: PipeTracker) -> PipeId {
        self.count += 1;
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(pipe);
            return PipeId(idx);
        }
        self.slots.push(Some(pipe));
        PipeId(self.slots.len() - 1)
    }

    pub fn get(&self, id: PipeId) -> Option<&PipeTracker> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: PipeId) -> Option<&mut PipeTracker> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: PipeId) -> Option<PipeTracker> {
        let pipe = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.count -= 1;
        Some(pipe)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PipeId, &PipeTracker)> {
        self.slots.iter().enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (PipeId(i), p)))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// A request waiting for its response.
#[derive(Debug, Default)]
pub struct RequestTracker {
    pub id: Option<RequestId>,
    pub smb_com: u8,
    pub uid: u16,
    pub tid: u16,
    pub pid: u32,
    pub mid: u16,

    pub pipe: Option<PipeId>,
    /// Pipes of opens chained in this request, bound to their FID when
    /// the response arrives.
    pub tmp_pipes: VecDeque<PipeId>,
    pub trans: Option<TransTracker>,

    /// FID a Close, WriteAndClose or ReadRaw request refers to.
    pub fid: Option<u16>,
    pub writeraw_remaining: u32,
    pub writeraw_writethrough: bool,

    /// Request's tree is IPC$.
    pub is_ipc: bool,
    /// A tree connect in this request targets IPC$.
    pub share_is_ipc: bool,

    /// Retain after the current response.
    pub keep: bool,
    /// Retire once the request is processed.
    pub discard: bool,

    /// Memory charged for this tracker and its buffers.
    pub mem: usize,
}

impl RequestTracker {
    /// Request ran against IPC$, directly or through a chained tree
    /// connect.
    pub fn on_ipc(&self) -> bool {
        self.is_ipc || self.share_is_ipc
    }
}

/// Outstanding requests: one inline tracker and a queue for the rest.
#[derive(Debug, Default)]
pub struct RequestQueue {
    inline: Option<RequestTracker>,
    queue: VecDeque<RequestTracker>,
    next_id: u64,
}

impl RequestQueue {
    pub fn inline_free(&self) -> bool {
        self.inline.is_none()
    }

    pub fn push(&mut self, mut rt: RequestTracker) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        rt.id = Some(id);
        if self.inline.is_none() {
            self.inline = Some(rt);
        } else {
            self.queue.push_back(rt);
        }
        id
    }

    pub fn get(&self, id: RequestId) -> Option<&RequestTracker> {
        self.iter().find(|rt| rt.id == Some(id))
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut RequestTracker> {
        self.iter_mut().find(|rt| rt.id == Some(id))
    }

    /// Oldest tracker matching `f`.
    pub fn find<F>(&self, f: F) -> Option<RequestId>
        where F: Fn(&RequestTracker) -> bool
    {
        self.iter().find(|rt| f(*rt)).and_then(|rt| rt.id)
    }

    pub fn remove(&mut self, id: RequestId) -> Option<RequestTracker> {
        if matches!(&self.inline, Some(rt) if rt.id == Some(id)) {
            return self.inline.take();
        }
        let pos = self.queue.iter().position(|rt| rt.id == Some(id))?;
        self.queue.remove(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestTracker> {
        self.inline.iter().chain(self.queue.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RequestTracker> {
        self.inline.iter_mut().chain(self.queue.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.inline.is_some() as usize + self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SMBState {
    pub fn insert_uid(&mut self, uid: u16) {
        SCLogDebug!("uid {} added", uid);
        self.uids.insert(uid, ());
    }

    /// Remove a UID. Its pipes go with it unless the policy keeps them.
    pub fn remove_uid(&mut self, uid: u16) {
        self.uids.remove(uid);
        if !self.policy.traits().uid_removal_closes_pipes {
            return;
        }
        let pipes: Vec<PipeId> = self.pipes.iter()
            .filter(|(_, p)| p.uid == uid)
            .map(|(id, _)| id)
            .collect();
        for id in pipes {
            self.remove_pipe(id);
        }
    }

    pub fn insert_tid(&mut self, tid: u16, is_ipc: bool) {
        SCLogDebug!("tid {} added, ipc {}", tid, is_ipc);
        self.tids.insert(tid, is_ipc);
    }

    /// Remove a TID and every pipe opened on it.
    pub fn remove_tid(&mut self, tid: u16) {
        self.tids.remove(tid);
        let pipes: Vec<PipeId> = self.pipes.iter()
            .filter(|(_, p)| p.tid == tid)
            .map(|(id, _)| id)
            .collect();
        for id in pipes {
            self.remove_pipe(id);
        }
    }

    /// Whether the TID is known, and if so whether it is IPC$.
    pub fn tid_is_ipc(&self, tid: u16) -> Option<bool> {
        self.tids.get(tid).copied()
    }

    pub fn new_pipe(&mut self, uid: u16, tid: u16, fid: Option<u16>, byte_mode: bool) -> Option<PipeId> {
        if !self.mem_alloc(std::mem::size_of::<PipeTracker>()) {
            return None;
        }
        let id = self.pipes.insert(PipeTracker {
            uid,
            tid,
            fid: None,
            byte_mode,
            used: false,
            co_tracker: CoTracker::default(),
        });
        if let Some(fid) = fid {
            self.bind_pipe(id, uid, tid, fid, byte_mode);
        }
        Some(id)
    }

    /// Give a pipe its FID and the UID/TID of the open that created it.
    /// A pipe already holding the FID is replaced.
    pub fn bind_pipe(&mut self, id: PipeId, uid: u16, tid: u16, fid: u16, byte_mode: bool) {
        if let Some(old) = self.pipes_by_fid.get(&fid).copied() {
            if old != id {
                self.remove_pipe(old);
            }
        }
        if let Some(pipe) = self.pipes.get_mut(id) {
            pipe.uid = uid;
            pipe.tid = tid;
            pipe.fid = Some(fid);
            pipe.byte_mode = byte_mode;
            self.pipes_by_fid.insert(fid, id);
        }
    }

    /// Pipe reachable by this UID/TID/FID under the active policy.
    pub fn find_pipe(&self, uid: u16, tid: u16, fid: u16) -> Option<PipeId> {
        let id = *self.pipes_by_fid.get(&fid)?;
        let pipe = self.pipes.get(id)?;
        let ok = match self.policy.traits().pipe_lookup.access(pipe.used) {
            PipeAccess::AnyValidUid => self.uids.contains(uid),
            PipeAccess::CreatorUid => pipe.uid == uid,
            PipeAccess::CreatorUidTid => pipe.uid == uid && pipe.tid == tid,
        };
        if ok { Some(id) } else { None }
    }

    /// Drop a pipe and every reference outstanding requests hold to it.
    pub fn remove_pipe(&mut self, id: PipeId) {
        let pipe = match self.pipes.remove(id) {
            Some(p) => p,
            None => { return; }
        };
        SCLogDebug!("pipe fid {:?} removed", pipe.fid);
        if let Some(fid) = pipe.fid {
            if self.pipes_by_fid.get(&fid) == Some(&id) {
                self.pipes_by_fid.remove(&fid);
            }
        }
        for rt in self.requests.iter_mut() {
            if rt.pipe == Some(id) {
                rt.pipe = None;
            }
            rt.tmp_pipes.retain(|p| *p != id);
        }
        self.mem_free(std::mem::size_of::<PipeTracker>());
    }

    /// Track a new request. Returns None if memory for it was refused.
    pub fn new_request(&mut self, hdr: &SmbRecord, smb_com: u8) -> Option<RequestId> {
        let outstanding = self.requests.len();
        if outstanding >= self.max_outstanding as usize {
            self.set_event_args(SMBEvent::MaxRequestsExceeded, vec![
                    AlertArg::Int(outstanding as u64),
                    AlertArg::Int(self.max_outstanding as u64)]);
        }
        let mid = hdr.multiplex_id;
        if self.requests.iter().any(|rt| rt.mid == mid) {
            self.set_event_args(SMBEvent::RequestsSameMid, vec![AlertArg::Int(mid as u64)]);
        }
        let mut mem = 0;
        if !self.requests.inline_free() {
            mem = std::mem::size_of::<RequestTracker>();
            if !self.mem_alloc(mem) {
                return None;
            }
        }
        let is_ipc = self.tid_is_ipc(hdr.tree_id).unwrap_or(false);
        let rt = RequestTracker {
            smb_com,
            uid: hdr.user_id,
            tid: hdr.tree_id,
            pid: hdr.process_id,
            mid,
            is_ipc,
            mem,
            ..Default::default()
        };
        Some(self.requests.push(rt))
    }

    /// Tracker a response or secondary request belongs to.
    pub fn find_request(&self, hdr: &SmbRecord, smb_com: u8) -> Option<RequestId> {
        let pid = hdr.process_id;
        let mid = hdr.multiplex_id;
        if hdr.is_response() {
            return self.requests.find(|rt| rt.pid == pid && rt.mid == mid);
        }
        let primary = smb1_trans_primary(smb_com)?;
        let match_uid_tid = self.policy.traits().secondary_match_uid_tid;
        self.requests.find(|rt| {
            rt.pid == pid && rt.mid == mid && rt.smb_com == primary &&
                (!match_uid_tid || (rt.uid == hdr.user_id && rt.tid == hdr.tree_id))
        })
    }

    /// Retire a request and what it owns: unbound chained pipes and
    /// transaction buffers.
    pub fn remove_request(&mut self, id: RequestId) {
        let rt = match self.requests.remove(id) {
            Some(rt) => rt,
            None => { return; }
        };
        for pipe in rt.tmp_pipes.iter() {
            let unbound = self.pipes.get(*pipe).map(|p| p.fid.is_none()).unwrap_or(false);
            if unbound {
                self.remove_pipe(*pipe);
            }
        }
        if self.raw_request == Some(id) {
            self.raw_request = None;
        }
        let trans_mem = rt.trans.as_ref().map(|t| t.mem).unwrap_or(0);
        self.mem_free(rt.mem + trans_mem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idmap() {
        let mut m: IdMap<bool> = IdMap::default();
        assert!(m.is_empty());
        m.insert(1, false);
        m.insert(2, true);
        m.insert(1, true);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(1), Some(&true));
        assert_eq!(m.remove(1), Some(true));
        assert!(!m.contains(1));
        assert!(m.contains(2));
        // first slot is reused
        m.insert(3, false);
        assert_eq!(m.len(), 2);
        assert_eq!(m.remove(2), Some(true));
        assert_eq!(m.remove(2), None);
        assert_eq!(m.len(), 1);
    }

    fn pipe(uid: u16) -> PipeTracker {
        PipeTracker {
            uid,
            tid: 1,
            fid: None,
            byte_mode: false,
            used: false,
            co_tracker: CoTracker::default(),
        }
    }

    #[test]
    fn test_pipe_arena() {
        let mut a = PipeArena::default();
        let p1 = a.insert(pipe(1));
        let p2 = a.insert(pipe(2));
        assert_eq!(a.len(), 2);
        assert_eq!(a.remove(p1).map(|p| p.uid), Some(1));
        assert!(a.get(p1).is_none());
        assert!(a.remove(p1).is_none());
        let p3 = a.insert(pipe(3));
        assert_eq!(p3, p1);
        assert_eq!(a.get(p2).map(|p| p.uid), Some(2));
        assert_eq!(a.iter().count(), 2);
    }

    #[test]
    fn test_request_queue() {
        let mut q = RequestQueue::default();
        assert!(q.inline_free());
        let a = q.push(RequestTracker { mid: 1, ..Default::default() });
        assert!(!q.inline_free());
        let b = q.push(RequestTracker { mid: 2, ..Default::default() });
        assert_eq!(q.len(), 2);
        assert_eq!(q.find(|rt| rt.mid == 2), Some(b));
        assert_eq!(q.remove(a).map(|rt| rt.mid), Some(1));
        assert!(q.inline_free());
        assert_eq!(q.get(b).map(|rt| rt.mid), Some(2));
        q.get_mut(b).unwrap().keep = true;
        assert!(q.iter().all(|rt| rt.keep));
    }
}
