use bytes::Bytes;

/// A job returned by `reserve` or one of the `peek` commands.
///
/// The client never tracks a job after the call returns; `id` is all the
/// server needs to delete, release, bury or touch it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub body: Bytes,
}

impl Job {
    pub fn new(id: u64, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    /// The body as UTF-8, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
