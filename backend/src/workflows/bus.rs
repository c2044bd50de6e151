// Event Bus - Fire-and-forget delivery of domain events to the workflow engine

use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::WorkflowEngine;
use super::triggers::{EventPayload, EventSource, TriggerEvent};

const SUBSCRIBER_CAPACITY: usize = 256;

/// Cheap to clone; every clone feeds the same dispatcher
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<TriggerEvent>,
    subscribers: broadcast::Sender<TriggerEvent>,
}

impl EventBus {
    /// Start the dispatcher task that hands each event to the engine
    pub fn start(engine: WorkflowEngine) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TriggerEvent>();
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let fanout = subscribers.clone();

        let handle = tokio::spawn(async move {
            info!("Event bus dispatcher started");
            while let Some(event) = receiver.recv().await {
                debug!("Dispatching event '{}' ({})", event.event_name, event.event_id);
                // No subscribers is fine
                let _ = fanout.send(event.clone());
                engine.process_event(&event).await;
            }
            info!("Event bus dispatcher stopped");
        });

        (Self { sender, subscribers }, handle)
    }

    /// Publish a named event. Returns immediately with the event id.
    pub fn publish(&self, event_name: &str, payload: EventPayload) -> Uuid {
        self.emit(TriggerEvent::new(event_name, payload, EventSource::System))
    }

    pub fn emit(&self, event: TriggerEvent) -> Uuid {
        let event_id = event.event_id;
        if let Err(e) = self.sender.send(event) {
            warn!("Event bus is closed, dropping event '{}'", e.0.event_name);
        }
        event_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.subscribers.subscribe()
    }

    /// Stream of events with the given name, as seen by the dispatcher
    pub fn on(&self, event_name: &str) -> impl Stream<Item = TriggerEvent> + Send + use<> {
        let receiver = self.subscribe();
        let event_name = event_name.to_string();

        futures::stream::unfold((receiver, event_name), |(mut receiver, event_name)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.event_name == event_name => return Some((event, (receiver, event_name))),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber for '{}' lagged by {} events", event_name, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}
