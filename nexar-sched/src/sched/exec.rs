use super::{BufRef, Schedule, StepId, StepKind, StepState};
use crate::error::Result;
use crate::transport::{Transport, local_copy};

impl Schedule {
    fn addr(&mut self, buf: BufRef) -> u64 {
        match buf {
            BufRef::User(p) => p,
            BufRef::Temp { id, offset } => {
                let temp = &mut self.temps[id];
                assert!(
                    offset <= temp.len(),
                    "offset {offset} past temporary buffer {id} of {} bytes",
                    temp.len()
                );
                temp.as_mut_ptr() as u64 + offset as u64
            }
        }
    }

    /// Issue ready steps and test in-flight ones until nothing changes.
    ///
    /// Returns `Ok(true)` once every step is done. On the first error all
    /// in-flight transport operations are cancelled and the error is
    /// returned; the schedule must not be progressed again.
    ///
    /// Buffers named by the steps must be valid, which the unsafe entry
    /// points that create running schedules require of their callers.
    pub(crate) fn progress(&mut self, transport: &dyn Transport) -> Result<bool> {
        if !self.started {
            self.started = true;
            self.ready = (0..self.steps.len())
                .filter(|&i| self.steps[i].pending == 0)
                .collect();
        }
        match self.drive(transport) {
            Ok(()) => Ok(self.is_complete()),
            Err(e) => {
                self.abort(transport);
                Err(e)
            }
        }
    }

    fn drive(&mut self, transport: &dyn Transport) -> Result<()> {
        loop {
            while let Some(id) = self.ready.pop_front() {
                self.issue(id, transport)?;
            }

            let mut finished = Vec::new();
            let mut waiting = std::mem::take(&mut self.in_flight).into_iter();
            while let Some(id) = waiting.next() {
                let StepState::Issued(op) = self.steps[id].state else {
                    unreachable!("in-flight step {id} was not issued");
                };
                match transport.test(op) {
                    Ok(true) => finished.push(id),
                    Ok(false) => self.in_flight.push(id),
                    Err(e) => {
                        // The failed handle is released; keep the rest for abort.
                        self.in_flight.extend(waiting);
                        return Err(e);
                    }
                }
            }
            for id in finished {
                self.complete(id);
            }

            if self.ready.is_empty() {
                return Ok(());
            }
        }
    }

    fn issue(&mut self, id: StepId, transport: &dyn Transport) -> Result<()> {
        let kind = self.steps[id].kind.clone();
        match kind {
            StepKind::Send {
                rank,
                msg,
                buf,
                count,
                dtype,
            } => {
                let addr = self.addr(buf);
                let op = unsafe { transport.post_send(msg, addr, count, &dtype)? };
                tracing::trace!(step = id, dest = rank, tag = msg.tag, "send issued");
                self.steps[id].state = StepState::Issued(op);
                self.in_flight.push(id);
            }
            StepKind::Recv {
                rank,
                msg,
                buf,
                count,
                dtype,
            } => {
                let addr = self.addr(buf);
                let op = unsafe { transport.post_recv(msg, addr, count, &dtype)? };
                tracing::trace!(step = id, src = rank, tag = msg.tag, "recv issued");
                self.steps[id].state = StepState::Issued(op);
                self.in_flight.push(id);
            }
            StepKind::Copy {
                src,
                scount,
                stype,
                dst,
                rcount,
                rtype,
            } => {
                let s = self.addr(src);
                let d = self.addr(dst);
                unsafe { local_copy(s, scount, &stype, d, rcount, &rtype)? };
                self.complete(id);
            }
            StepKind::Barrier => self.complete(id),
        }
        Ok(())
    }

    fn complete(&mut self, id: StepId) {
        self.steps[id].state = StepState::Done;
        self.completed += 1;
        for i in 0..self.steps[id].dependents.len() {
            let dep = self.steps[id].dependents[i];
            let step = &mut self.steps[dep];
            step.pending -= 1;
            if step.pending == 0 {
                self.ready.push_back(dep);
            }
        }
    }

    /// Cancel every in-flight transport operation.
    pub(crate) fn abort(&mut self, transport: &dyn Transport) {
        for id in self.in_flight.drain(..) {
            if let StepState::Issued(op) = self.steps[id].state {
                transport.cancel(op);
                self.steps[id].state = StepState::Waiting;
            }
        }
        self.ready.clear();
    }
}
