//! Effect handlers: `SET_HANDLER`, `DO`, `POP_HANDLERS` and `resume`.
//!
//! A `try` registers one handler per clause; the clauses of one `try` form a
//! group (same frame, same end target). Performing an effect runs the
//! matching handler as an ordinary call on top of the performing frame, with
//! the handler's group and everything above it stashed. The handler frame
//! carries an [`EffectLink`]. Calling `resume(v)` transfers back into the
//! suspended frame; returning from the handler abandons the suspended
//! computation and completes the `try` with the handler's value.

use std::rc::Rc;

use tracing::debug;

use super::chunk::Closure;
use super::error::{Exception, HostFault, RuntimeError};
use super::value::Value;
use super::vm::Vm;

/// A registered effect handler.
pub(crate) struct Handler {
    pub(crate) name: String,
    pub(crate) closure: Rc<Closure>,
    /// Index of the frame that executed the `try`.
    pub(crate) frame: usize,
    /// Operand stack depth of that frame at registration.
    pub(crate) stack_depth: usize,
    /// Offset of the end of the `try`.
    pub(crate) target: usize,
}

impl Handler {
    fn same_group(&self, other: &Handler) -> bool {
        self.frame == other.frame && self.target == other.target
    }
}

/// Attached to the frame running a handler.
pub(crate) struct EffectLink {
    /// Frame suspended at the `DO`.
    resume_into: usize,
    /// Frame that owns the `try`.
    handler_frame: usize,
    stack_depth: usize,
    target: usize,
    /// Position of the handler group in the handler list.
    group_start: usize,
    /// The handler group and every handler above it, masked while the
    /// handler runs.
    stash: Vec<Handler>,
}

impl Vm {
    pub(crate) fn set_handler(
        &mut self,
        name: String,
        distance: usize,
    ) -> Result<(), RuntimeError> {
        let frame_index = self.frame_count().saturating_sub(1);
        let frame = self.frame_mut()?;
        let closure = match frame.pop()? {
            Value::Closure(closure) => closure,
            other => {
                return Err(Exception::type_error(format!(
                    "handler for '{}' must be a function, got {}",
                    name,
                    other.type_name()
                ))
                .into());
            }
        };
        let handler = Handler {
            name,
            closure,
            frame: frame_index,
            stack_depth: frame.stack.len(),
            target: frame.ip + distance,
        };
        self.handlers.push(handler);
        Ok(())
    }

    /// `DO name`: the payload is on top of the current frame's stack.
    pub(crate) fn perform(&mut self, name: String) -> Result<(), RuntimeError> {
        let payload = self.pop()?;
        let Some(index) = self.handlers.iter().rposition(|h| h.name == name) else {
            return Err(RuntimeError::UnhandledEffect {
                name,
                trace: Vec::new(),
            });
        };

        let handlers = &self.handlers;
        let mut group_start = index;
        while group_start > 0 && handlers[group_start - 1].same_group(&handlers[index]) {
            group_start -= 1;
        }
        let stash = self.handlers.split_off(group_start);
        let handler = &stash[index - group_start];
        let closure = Rc::clone(&handler.closure);
        let handler_frame = handler.frame;
        let stack_depth = handler.stack_depth;
        let target = handler.target;
        let resume_into = self.frame_count().saturating_sub(1);
        debug!(
            target: "sable::effects",
            effect = %name,
            handler = %closure.function.name,
            depth = resume_into,
            "perform"
        );

        self.push(Value::Closure(closure))?;
        self.push(payload)?;
        self.call(1)?;
        if self.frame_count() != resume_into + 2 {
            let message = format!("handler for '{}' did not open a frame", name);
            return Err(HostFault::Corrupt(message).into());
        }
        self.frame_mut()?.effect = Some(EffectLink {
            resume_into,
            handler_frame,
            stack_depth,
            target,
            group_start,
            stash,
        });
        Ok(())
    }

    /// Transfer control back into the innermost suspended `DO`. The value is
    /// returned to the caller, which pushes it onto the resumed frame.
    pub(crate) fn resume(&mut self, value: Value) -> Result<Value, RuntimeError> {
        let frames = self.frames_mut();
        let Some(link) = frames.iter_mut().rev().find_map(|f| f.effect.take()) else {
            let message = "resume called outside of an effect handler";
            return Err(Exception::type_error(message).into());
        };
        frames.truncate(link.resume_into + 1);
        self.handlers.truncate(link.group_start);
        self.handlers.extend(link.stash);
        debug!(target: "sable::effects", depth = link.resume_into, "resume");
        Ok(value)
    }

    /// The handler returned without resuming: the `try` completes with
    /// `value`.
    pub(crate) fn abandon(&mut self, link: EffectLink, value: Value) -> Result<(), RuntimeError> {
        debug!(target: "sable::effects", depth = link.handler_frame, "abandon");
        self.frames_mut().truncate(link.handler_frame + 1);
        self.handlers.truncate(link.group_start);
        let frame = self.frame_mut()?;
        frame.stack.truncate(link.stack_depth);
        frame.ip = link.target;
        frame.push(value)?;
        Ok(())
    }
}
