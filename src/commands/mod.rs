mod channel;
mod play;
mod poll;
mod submit;
mod version;

pub use channel::Channel;
pub use play::{Play, PlayAction};
pub use poll::Poll;
pub use submit::Submit;
pub use version::Version;
