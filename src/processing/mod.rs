// THEORY:
// `processing` is the orchestrator. The controller is the command surface the
// shell talks to; the loop worker is the dedicated blocking task that runs
// one read → analyze → annotate → alert → publish → record cycle after
// another; the bus carries results back out.
//
// Key architectural principles:
// 1.  **One owner per device**: the camera belongs to the running loop, the
//     recording writer to the recording slot, the background model to the
//     loop's pipeline. The shell never touches them.
// 2.  **Run state gates everything**: Idle → Running → Stopping → Idle. Only
//     the party that wins the Running → Stopping transition tears down, so
//     an explicit stop racing a camera failure never double-closes anything.
// 3.  **Nobody waits on anybody**: the loop publishes into watch slots, the
//     shell reads snapshots, and a stop waits for the worker only for a
//     bounded time before releasing the camera itself.

pub mod controller;
pub mod loop_worker;
pub mod publish;

pub use controller::{DetectionController, Devices, RecordingToggle, RunState};
pub use publish::{FrameBus, Notice, PublishedFrame, Status};
