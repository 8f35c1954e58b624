//! Exception engine: the handler search pass
//!
//! Exception delivery is two-pass. This module implements the first
//! pass: capture the stack trace, then walk the frame chain outward
//! matching clauses against each frame's saved instruction pointer.
//! Filter clauses execute here, on the throwing thread, as a nested
//! dispatch over the filter range with the exception as the single stack
//! value. The second pass (running finally and fault handlers while
//! unwinding toward the matched clause) lives in the dispatch loop.
//!
//! Native frames between managed frames need no special casing in the
//! walk: a managed frame entered from native code links to the managed
//! frame recorded below the transition, which is exactly what the LMF
//! bracket preserves.

use cilrun_cil::body::ClauseKind;

use crate::frame::Frame;
use crate::interp::{capture_backtrace, Interp, RunOutcome, Unwind};
use crate::object::ObjRef;

impl<'e> Interp<'e> {
    /// Find the handler for `exc` thrown at `throw_ip` of `throwing`.
    ///
    /// Returns an unhandled [`Unwind`] when no clause matches anywhere in
    /// the chain; the caller then forwards the exception to the host.
    ///
    /// # Safety
    /// `throwing` must be the innermost live frame and `exc` non-null.
    pub(crate) unsafe fn search_handler(
        &self,
        throwing: &Frame,
        throw_ip: u32,
        exc: ObjRef,
    ) -> Unwind {
        let rt = self.engine.object_runtime();
        let meta = self.engine.metadata();

        let trace = capture_backtrace(throwing as *const Frame as *mut Frame);
        rt.record_stack_trace(exc, &trace);

        let exc_class = exc.class();
        let mut cur: *mut Frame = throwing as *const Frame as *mut Frame;
        let mut ip = throw_ip;
        while !cur.is_null() {
            let frame = &*cur;
            frame.pending_exception.set(exc);
            if let Some(mcode) = frame.imethod.code() {
                for (idx, clause) in mcode.clauses.iter().enumerate() {
                    if !clause.covers(ip) {
                        continue;
                    }
                    match clause.kind {
                        ClauseKind::Catch => {
                            let matches = clause
                                .catch_class
                                .is_some_and(|c| meta.is_assignable(exc_class, c));
                            if matches {
                                return Unwind {
                                    exc,
                                    target: cur,
                                    handler_ip: clause.handler_start,
                                    clause_index: idx as u32,
                                };
                            }
                        }
                        ClauseKind::Filter => {
                            let decision =
                                match self.run_clause(frame, clause.filter_start, Some(exc)) {
                                    RunOutcome::FilterResult(v) => v,
                                    // A filter that faults declines the
                                    // exception.
                                    _ => 0,
                                };
                            if decision != 0 {
                                return Unwind {
                                    exc,
                                    target: cur,
                                    handler_ip: clause.handler_start,
                                    clause_index: idx as u32,
                                };
                            }
                        }
                        ClauseKind::Finally | ClauseKind::Fault => {}
                    }
                }
            }
            cur = frame.parent;
            if !cur.is_null() {
                ip = (*cur).ip.get();
            }
        }
        Unwind::unhandled(exc)
    }
}
