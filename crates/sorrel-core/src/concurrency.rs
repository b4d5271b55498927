use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self, Receiver, Select, Sender};

use crate::error::SorrelError;
use crate::types::TypeDesc;
use crate::value::Value;

static NEXT_CHAN_ID: AtomicUsize = AtomicUsize::new(1);

/// A script channel: rendezvous (capacity 0) or bounded FIFO. Close is a
/// one-shot that drops the stored sender so drained receives observe
/// disconnection.
#[derive(Clone)]
pub struct ChanHandle {
    inner: Arc<ChanInner>,
}

struct ChanInner {
    sender: Mutex<Option<Sender<Value>>>,
    receiver: Receiver<Value>,
    closed: AtomicBool,
    capacity: Option<usize>,
    elem: Option<TypeDesc>,
    id: usize,
}

impl ChanHandle {
    /// `capacity: None` is unbounded (used internally); `Some(0)` rendezvous.
    pub fn new(capacity: Option<usize>, elem: Option<TypeDesc>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        let id = NEXT_CHAN_ID.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::new(ChanInner {
                sender: Mutex::new(Some(sender)),
                receiver,
                closed: AtomicBool::new(false),
                capacity,
                elem,
                id,
            }),
        }
    }

    pub fn elem_type(&self) -> Option<TypeDesc> {
        self.inner.elem.clone()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Buffered values currently queued.
    pub fn len(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) -> Result<(), SorrelError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(SorrelError::channel("close of closed channel"));
        }
        self.inner.sender.lock().unwrap().take();
        Ok(())
    }

    /// Blocking send, racing the context's cancellation wakeup. The value must
    /// already be converted to the element type.
    pub fn send(&self, value: Value, ctx: &ExecContext) -> Result<(), SorrelError> {
        if self.is_closed() {
            return Err(SorrelError::channel("send on closed channel"));
        }
        if ctx.is_cancelled() {
            return Err(SorrelError::Interrupt);
        }
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SorrelError::channel("send on closed channel"))?;
        let cancel_rx = ctx.wakeup();
        let mut select = Select::new();
        let send_index = select.send(&sender);
        let cancel_index = select.recv(cancel_rx);
        let oper = select.select();
        match oper.index() {
            i if i == send_index => oper
                .send(&sender, value)
                .map_err(|_| SorrelError::channel("send on closed channel")),
            i if i == cancel_index => {
                let _ = oper.recv(cancel_rx);
                Err(SorrelError::Interrupt)
            }
            _ => unreachable!("select returned unknown index"),
        }
    }

    /// Blocking receive. Returns `(value, true)` for a delivered value and
    /// `(zero, false)` once the channel is closed and drained.
    pub fn recv(&self, ctx: &ExecContext) -> Result<(Value, bool), SorrelError> {
        if ctx.is_cancelled() {
            return Err(SorrelError::Interrupt);
        }
        let cancel_rx = ctx.wakeup();
        let mut select = Select::new();
        let recv_index = select.recv(&self.inner.receiver);
        let cancel_index = select.recv(cancel_rx);
        let oper = select.select();
        match oper.index() {
            i if i == recv_index => match oper.recv(&self.inner.receiver) {
                Ok(value) => Ok((value, true)),
                Err(_) => Ok((self.zero_value(), false)),
            },
            i if i == cancel_index => {
                let _ = oper.recv(cancel_rx);
                Err(SorrelError::Interrupt)
            }
            _ => unreachable!("select returned unknown index"),
        }
    }

    fn zero_value(&self) -> Value {
        self.inner
            .elem
            .as_ref()
            .map(|desc| desc.zero())
            .unwrap_or(Value::Nil)
    }

    pub fn ptr_eq(&self, other: &ChanHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }
}

impl fmt::Display for ChanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.capacity {
            Some(cap) => write!(f, "chan({}/{})", self.len(), cap),
            None => write!(f, "chan({})", self.len()),
        }
    }
}

/// Host-facing cancellation context. Shared by every task of one execution;
/// the flag is monotonic and `wakeup()` becomes permanently ready on cancel so
/// blocked channel operations are released.
pub struct ExecContext {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    wakeup_tx: Mutex<Option<Sender<()>>>,
    wakeup_rx: Receiver<()>,
}

impl ExecContext {
    pub fn new() -> Arc<ExecContext> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        Arc::new(ExecContext {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            wakeup_tx: Mutex::new(Some(tx)),
            wakeup_rx: rx,
        })
    }

    /// A context that cancels itself after `delay`, for deadline-style hosts.
    pub fn with_deadline(delay: Duration) -> Arc<ExecContext> {
        let ctx = ExecContext::new();
        let timed = Arc::clone(&ctx);
        thread::spawn(move || {
            thread::sleep(delay);
            timed.cancel_with_reason("deadline exceeded");
        });
        ctx
    }

    pub fn cancel(&self) {
        self.cancel_inner(None);
    }

    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        self.cancel_inner(Some(reason.into()));
    }

    fn cancel_inner(&self, reason: Option<String>) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(reason) = reason {
            *self.reason.lock().unwrap() = Some(reason);
        }
        // Dropping the sender disconnects the wakeup channel, making every
        // select over it ready.
        self.wakeup_tx.lock().unwrap().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }

    /// Fails with `Interrupt` once the context is cancelled. Polled at every
    /// statement boundary and loop iteration.
    pub fn check(&self) -> Result<(), SorrelError> {
        if self.is_cancelled() {
            Err(SorrelError::Interrupt)
        } else {
            Ok(())
        }
    }

    fn wakeup(&self) -> &Receiver<()> {
        &self.wakeup_rx
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        ExecContext {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            wakeup_tx: Mutex::new(Some(tx)),
            wakeup_rx: rx,
        }
    }
}

fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic occurred".to_string()
    }
}

/// Run `f`, converting a panic from a host callable into an ordinary runtime
/// error so a goroutine cannot take the process down.
pub(crate) fn call_guarded<F>(f: F) -> Result<Value, SorrelError>
where
    F: FnOnce() -> Result<Value, SorrelError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(SorrelError::InvalidOperation(crate::error::ErrorData::new(
            format!("panic: {}", panic_payload_message(payload)),
        ))),
    }
}
