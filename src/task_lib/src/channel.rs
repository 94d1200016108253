//==================================================================================================
// Imports
//==================================================================================================
use mem_lib::Request;
use tokio::sync::mpsc::{
    self,
    error::TryRecvError,
};

//==================================================================================================
// Structures
//==================================================================================================
/// Producer side of the request channel. Cloned once per user process.
pub type RequestSender = mpsc::Sender<Request>;

/// Consumer side of the request channel.
///
/// Reads never block: an empty channel is a normal idle tick, not an error.
#[derive(Debug)]
pub struct RequestChannel {
    receiver	: mpsc::Receiver<Request>,
    closed	: bool,
}

/// Result of a single non-blocking read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Poll {
    Message(Request),
    /// Nothing pending this tick.
    Empty,
    /// Every sender is gone, or the channel was closed by the consumer.
    Closed,
}

//==================================================================================================
// Implementations
//==================================================================================================
impl RequestChannel {
    /// Creates a bounded FIFO channel holding up to `capacity` pending requests.
    pub fn new(capacity: usize) -> (RequestSender, Self) {
	let (transmitter, receiver) = mpsc::channel(capacity.max(1));
	(transmitter, Self { receiver, closed: false })
    }

    /// Takes the oldest pending request, if any.
    pub fn poll(&mut self) -> Poll {
	match self.receiver.try_recv() {
	    Ok(request) => Poll::Message(request),
	    Err(TryRecvError::Empty) => Poll::Empty,
	    Err(TryRecvError::Disconnected) => Poll::Closed,
	}
    }

    /// Stops accepting requests. Senders fail from now on. Calling it again is a no-op.
    pub fn close(&mut self) {
	if !self.closed {
	    self.receiver.close();
	    self.closed = true;
	}
    }

    pub fn is_closed(&self) -> bool {
	self.closed
    }
}

//==================================================================================================
// Tests
//==================================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use mem_lib::{Action, PageNumber, ProcessId};

    #[tokio::test]
    async fn test_poll_is_fifo_and_non_blocking() {
	let (sender, mut channel) = RequestChannel::new(8);
	assert_eq!(channel.poll(), Poll::Empty);

	let first = Request::access(ProcessId(1), PageNumber(0), Action::Read);
	let second = Request::access(ProcessId(2), PageNumber(5), Action::Write);
	sender.send(first).await.unwrap();
	sender.send(second).await.unwrap();

	assert_eq!(channel.poll(), Poll::Message(first));
	assert_eq!(channel.poll(), Poll::Message(second));
	assert_eq!(channel.poll(), Poll::Empty);

	drop(sender);
	assert_eq!(channel.poll(), Poll::Closed);
    }

    #[tokio::test]
    async fn test_close_rejects_senders() {
	let (sender, mut channel) = RequestChannel::new(2);
	channel.close();
	channel.close();
	assert!(channel.is_closed());

	let request = Request::terminate(ProcessId(1), PageNumber(0));
	assert!(sender.send(request).await.is_err());
    }
}
