//! Stream throttling utilities

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per interval
    ///
    /// The inner stream is always drained at its own pace. An item is passed
    /// through when at least `duration` has elapsed since the last emitted
    /// item; every other item is dropped. Order is never changed and the
    /// first item is always emitted.
    fn throttle(self, duration: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S> {
        #[pin]
        stream: S,
        duration: Duration,
        last_emit: Option<Instant>,
    }
}

impl<S: Stream> Throttle<S> {
    /// Create a new throttled stream
    pub fn new(stream: S, duration: Duration) -> Self {
        Self { stream, duration, last_emit: None }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    let now = Instant::now();
                    let due = this.last_emit.is_none_or(|last| now - last >= *this.duration);
                    if due {
                        *this.last_emit = Some(now);
                        return Poll::Ready(Some(item));
                    }
                    // Dropped; keep draining
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.stream.size_hint().1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn first_item_passes_and_burst_is_dropped() {
        let items = futures::stream::iter(1..=5).throttle(Duration::from_millis(100));
        let emitted: Vec<_> = items.collect().await;
        assert_eq!(emitted, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_once_per_interval_in_order() {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let producer = tokio::spawn(async move {
            for i in 0..10u32 {
                tx.send(i).await.unwrap();
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
        });

        let emitted: Vec<_> =
            ReceiverStream::new(rx).throttle(Duration::from_millis(100)).collect().await;
        producer.await.unwrap();

        // 0ms, 120ms, 240ms
        assert_eq!(emitted, vec![0, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_inner_does_not_end_stream() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let mut throttled = ReceiverStream::new(rx).throttle(Duration::from_millis(10));

        tx.send("a").await.unwrap();
        assert_eq!(throttled.next().await, Some("a"));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send("b").await.unwrap();
        });
        assert_eq!(throttled.next().await, Some("b"));
        assert_eq!(throttled.next().await, None);
    }
}
