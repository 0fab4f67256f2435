// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use zmq::Socket;

use crate::control::{ControlMessage, TaskHandle, control_endpoint};
use crate::queues::{QueueId, Queues};
use crate::TaskError;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Control queue high-water mark; a task with this many unread control messages is in trouble
/// anyway.
const CONTROL_HWM: i32 = 10;

/// What a concrete service supplies to the runtime. The runtime owns the control queue and the
/// loop; the service owns its queues and their handlers.
pub trait Service: Send + Sized {
    fn queues(&self) -> &Queues<Self>;

    /// Called once at the top of every cycle, before polling. For periodic work that isn't driven
    /// by incoming messages.
    fn on_tick(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Control commands other than STOP end up here. STOP never does; the runtime handles it.
    fn handle_control(&mut self, message: ControlMessage) -> Result<(), TaskError> {
        warn!(command = %message.command, "Ignoring unknown control message");
        Ok(())
    }
}

pub struct Task<S: Service> {
    name: String,
    zmq_context: zmq::Context,
    control: Socket,
    poll_timeout: Duration,
    service: S,
}

impl<S: Service> Task<S> {
    /// Binds the task's control queue. Fails if another task of the same name is bound in the same
    /// context.
    pub fn new(
        name: impl Into<String>,
        zmq_context: zmq::Context,
        service: S,
    ) -> Result<Self, TaskError> {
        let name = name.into();
        let control = zmq_context.socket(zmq::PULL)?;
        control.set_rcvhwm(CONTROL_HWM)?;
        control.bind(&control_endpoint(&name))?;
        Ok(Self {
            name,
            zmq_context,
            control,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            service,
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.name.clone(), self.zmq_context.clone())
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Block until a queue is ready or `timeout` passes, then run the handler of every ready queue
    /// once. The control queue goes first; if it says STOP, no other handler runs and
    /// `TaskError::Quit` is returned.
    pub fn poll(&mut self, timeout: Duration) -> Result<(), TaskError> {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        'poll: loop {
            let ready = self.ready_queues(timeout_ms)?;
            for queue in ready {
                let result = match queue {
                    None => self.handle_control_queue(),
                    Some(queue) => {
                        let handler = self.service.queues().handler(queue)?;
                        handler(&mut self.service, queue)
                    }
                };
                match result {
                    // A handler that would have blocked: go back to polling.
                    Err(TaskError::Transport(zmq::Error::EAGAIN)) => continue 'poll,
                    other => other?,
                }
            }
            return Ok(());
        }
    }

    /// The loop: tick, poll, repeat, until STOP. Handler errors other than STOP end the loop and
    /// are returned as-is; they are not caught here.
    pub fn run(mut self) -> Result<S, TaskError> {
        info!(task = %self.name, "Task starting");
        loop {
            let cycle = match self.service.on_tick() {
                Ok(()) => self.poll(self.poll_timeout),
                Err(e) => Err(e),
            };
            match cycle {
                Ok(()) => {}
                Err(TaskError::Quit) => break,
                Err(e) => {
                    error!(task = %self.name, error = ?e, "Task exiting on error");
                    return Err(e);
                }
            }
        }
        info!(task = %self.name, "Task stopped");
        Ok(self.service)
    }

    fn ready_queues(&self, timeout_ms: i64) -> Result<Vec<Option<QueueId>>, TaskError> {
        let mut ids = vec![None];
        let mut items = vec![self.control.as_poll_item(zmq::POLLIN)];
        for (id, item) in self.service.queues().poll_items() {
            ids.push(Some(id));
            items.push(item);
        }
        loop {
            match zmq::poll(&mut items, timeout_ms) {
                Ok(_) => break,
                Err(zmq::Error::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ids
            .into_iter()
            .zip(items.iter())
            .filter(|(_, item)| !item.get_revents().is_empty())
            .map(|(id, _)| id)
            .collect())
    }

    fn handle_control_queue(&mut self) -> Result<(), TaskError> {
        let bytes = self.control.recv_bytes(0)?;
        let message = match ControlMessage::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(task = %self.name, error = %e, "Discarding undecodable control message");
                return Ok(());
            }
        };
        if message.is_stop() {
            debug!(task = %self.name, "STOP received");
            return Err(TaskError::Quit);
        }
        self.service.handle_control(message)
    }
}

impl<S: Service + 'static> Task<S> {
    /// Start `run` on a thread named after the task.
    pub fn spawn(self) -> Result<RunningTask<S>, TaskError> {
        let handle = self.handle();
        let thread = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run())
            .map_err(TaskError::handler)?;
        Ok(RunningTask { handle, thread })
    }
}

/// A task whose loop is running on its own thread.
pub struct RunningTask<S> {
    handle: TaskHandle,
    thread: JoinHandle<Result<S, TaskError>>,
}

impl<S> RunningTask<S> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn request_stop(&self) -> Result<(), TaskError> {
        self.handle.request_stop()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to exit. Gives back the service on a clean stop.
    pub fn join(self) -> Result<S, TaskError> {
        let name = self.handle.name().to_string();
        self.thread
            .join()
            .map_err(|_| TaskError::Panicked(name))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    struct Recorder {
        queues: Queues<Self>,
        seen: Vec<(&'static str, Vec<u8>)>,
        ticks: usize,
        controls: Vec<ControlMessage>,
        notify: Option<mpsc::Sender<Vec<u8>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                queues: Queues::new(),
                seen: vec![],
                ticks: 0,
                controls: vec![],
                notify: None,
            }
        }

        fn handle_a(&mut self, queue: QueueId) -> Result<(), TaskError> {
            let msg = self.queues.socket(queue)?.recv_bytes(0)?;
            if let Some(notify) = &self.notify {
                notify.send(msg.clone()).ok();
            }
            self.seen.push(("a", msg));
            Ok(())
        }

        fn handle_b(&mut self, queue: QueueId) -> Result<(), TaskError> {
            let msg = self.queues.socket(queue)?.recv_bytes(0)?;
            self.seen.push(("b", msg));
            Ok(())
        }

        fn handle_fail(&mut self, queue: QueueId) -> Result<(), TaskError> {
            let msg = self.queues.socket(queue)?.recv_bytes(0)?;
            Err(TaskError::handler(format!(
                "refusing {}",
                String::from_utf8_lossy(&msg)
            )))
        }
    }

    impl Service for Recorder {
        fn queues(&self) -> &Queues<Self> {
            &self.queues
        }

        fn on_tick(&mut self) -> Result<(), TaskError> {
            self.ticks += 1;
            Ok(())
        }

        fn handle_control(&mut self, message: ControlMessage) -> Result<(), TaskError> {
            self.controls.push(message);
            Ok(())
        }
    }

    /// A PULL queue bound at `endpoint` and a PUSH connected to it.
    fn pipe(ctx: &zmq::Context, endpoint: &str) -> (Socket, Socket) {
        let pull = ctx.socket(zmq::PULL).unwrap();
        pull.bind(endpoint).unwrap();
        let push = ctx.socket(zmq::PUSH).unwrap();
        push.connect(endpoint).unwrap();
        (pull, push)
    }

    #[test]
    fn test_handler_runs_for_ready_queue() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-ready");
        let mut service = Recorder::new();
        service.queues.register(pull, Recorder::handle_a);
        let mut task = Task::new("ready", ctx, service).unwrap();

        push.send("hello", 0).unwrap();
        task.poll(Duration::from_secs(5)).unwrap();

        assert_eq!(task.service().seen, vec![("a", b"hello".to_vec())]);
    }

    #[test]
    fn test_poll_times_out_quietly() {
        let ctx = zmq::Context::new();
        let (pull, _push) = pipe(&ctx, "inproc://test-timeout");
        let mut service = Recorder::new();
        service.queues.register(pull, Recorder::handle_a);
        let mut task = Task::new("timeout", ctx, service).unwrap();

        task.poll(Duration::from_millis(10)).unwrap();
        assert!(task.service().seen.is_empty());
    }

    #[test]
    fn test_set_handler_replaces_handler() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-replace");
        let mut service = Recorder::new();
        let queue = service.queues.register(pull, Recorder::handle_a);
        service.queues.set_handler(queue, Recorder::handle_b).unwrap();
        let mut task = Task::new("replace", ctx, service).unwrap();

        push.send("x", 0).unwrap();
        task.poll(Duration::from_secs(5)).unwrap();

        assert_eq!(task.service().seen, vec![("b", b"x".to_vec())]);
    }

    #[test]
    fn test_set_handler_on_unknown_queue() {
        let mut queues: Queues<Recorder> = Queues::new();
        let ctx = zmq::Context::new();
        let other: Queues<Recorder> = {
            let mut q = Queues::new();
            q.register(ctx.socket(zmq::PULL).unwrap(), Recorder::handle_a);
            q
        };
        let (id, _) = other.poll_items().next().unwrap();
        assert!(matches!(
            queues.set_handler(id, Recorder::handle_b),
            Err(TaskError::UnknownQueue(_))
        ));
    }

    #[test]
    fn test_paused_queue_is_not_polled() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-pause");
        let mut service = Recorder::new();
        let queue = service.queues.register(pull, Recorder::handle_a);
        service
            .queues
            .set_interest(queue, zmq::PollEvents::empty())
            .unwrap();
        let mut task = Task::new("pause", ctx, service).unwrap();

        push.send("held", 0).unwrap();
        task.poll(Duration::from_millis(50)).unwrap();
        assert!(task.service().seen.is_empty());

        task.service_mut()
            .queues
            .set_interest(queue, zmq::POLLIN)
            .unwrap();
        task.poll(Duration::from_secs(5)).unwrap();
        assert_eq!(task.service().seen, vec![("a", b"held".to_vec())]);
    }

    #[test]
    fn test_stop_wins_over_pending_messages() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-stop-first");
        let mut service = Recorder::new();
        service.queues.register(pull, Recorder::handle_a);
        let mut task = Task::new("stop-first", ctx, service).unwrap();

        push.send("late", 0).unwrap();
        task.handle().request_stop().unwrap();

        assert!(matches!(
            task.poll(Duration::from_secs(5)),
            Err(TaskError::Quit)
        ));
        assert!(task.service().seen.is_empty());
    }

    #[test]
    fn test_custom_control_reaches_service() {
        let ctx = zmq::Context::new();
        let mut task = Task::new("custom", ctx, Recorder::new()).unwrap();
        let ping = ControlMessage::new("PING", vec!["1".to_string()]);
        task.handle().send_control(&ping).unwrap();

        task.poll(Duration::from_secs(5)).unwrap();

        assert_eq!(task.service().controls, vec![ping]);
    }

    #[test]
    fn test_undecodable_control_is_discarded() {
        let ctx = zmq::Context::new();
        let mut task = Task::new("garbage", ctx.clone(), Recorder::new()).unwrap();
        let push = ctx.socket(zmq::PUSH).unwrap();
        push.connect(&control_endpoint("garbage")).unwrap();
        let mut bytes = vec![0xfd];
        bytes.extend((1u64 << 50).to_le_bytes());
        push.send(bytes, 0).unwrap();

        task.poll(Duration::from_secs(5)).unwrap();
        assert!(task.service().controls.is_empty());

        task.handle().request_stop().unwrap();
        assert!(matches!(
            task.poll(Duration::from_secs(5)),
            Err(TaskError::Quit)
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let ctx = zmq::Context::new();
        let _first = Task::new("twin", ctx.clone(), Recorder::new()).unwrap();
        let second = Task::new("twin", ctx, Recorder::new());
        assert!(matches!(second, Err(TaskError::Transport(_))));
    }

    #[test]
    fn test_spawn_stop_join() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-spawn");
        let (notify, notified) = mpsc::channel();
        let mut service = Recorder::new();
        service.notify = Some(notify);
        service.queues.register(pull, Recorder::handle_a);
        let running = Task::new("spawned", ctx, service)
            .unwrap()
            .with_poll_timeout(Duration::from_millis(50))
            .spawn()
            .unwrap();

        push.send("work", 0).unwrap();
        assert_eq!(
            notified.recv_timeout(Duration::from_secs(5)).unwrap(),
            b"work".to_vec()
        );

        running.request_stop().unwrap();
        let service = running.join().unwrap();
        assert!(service.ticks >= 1);
        assert_eq!(service.seen, vec![("a", b"work".to_vec())]);
    }

    #[test]
    fn test_handler_error_ends_task() {
        let ctx = zmq::Context::new();
        let (pull, push) = pipe(&ctx, "inproc://test-fatal");
        let mut service = Recorder::new();
        service.queues.register(pull, Recorder::handle_fail);
        let running = Task::new("fatal", ctx, service)
            .unwrap()
            .with_poll_timeout(Duration::from_millis(50))
            .spawn()
            .unwrap();

        push.send("boom", 0).unwrap();
        let result = running.join();
        assert!(matches!(result, Err(TaskError::Handler(_))));
    }
}
