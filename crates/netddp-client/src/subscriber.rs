use netddp_frame::IncomingEvent;

/// Consumer of classified inbound events.
///
/// Invoked on the ingress worker thread, one event at a time, in arrival
/// order. A panic is caught and logged; later events are still delivered.
pub trait Subscriber: Send + 'static {
    fn data_received(&mut self, event: IncomingEvent);
}

impl<F> Subscriber for F
where
    F: FnMut(IncomingEvent) + Send + 'static,
{
    fn data_received(&mut self, event: IncomingEvent) {
        self(event)
    }
}

/// Subscriber that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSubscriber;

impl Subscriber for NullSubscriber {
    fn data_received(&mut self, _event: IncomingEvent) {}
}
