//! Event bus for broadcasting committed lifecycle changes.

use shop_types::ShopEvent;
use tokio::sync::broadcast;

/// Broadcast channel shared by the engine and its observers.
///
/// Publishing never blocks; slow subscribers lag and skip events instead.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ShopEvent>,
}

impl EventBus {
	/// Creates a new event bus buffering up to `capacity` events.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Creates a new subscriber that receives events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<ShopEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(&self, event: ShopEvent) -> Result<usize, broadcast::error::SendError<ShopEvent>> {
		self.sender.send(event)
	}
}
