use futures::future::BoxFuture;
use futures::stream::{FusedStream, FuturesUnordered, Stream, StreamExt};
use std::collections::HashSet;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Keyed set of running futures. A key is in progress from insertion until its
/// future's output has been yielded by the stream.
pub struct StreamMap<'a, K, V> {
    in_progress: HashSet<K>,
    futures: FuturesUnordered<BoxFuture<'a, (K, V)>>,
}

impl<K, V> Default for StreamMap<'_, K, V> {
    fn default() -> Self {
        Self {
            in_progress: HashSet::new(),
            futures: FuturesUnordered::new(),
        }
    }
}

impl<'a, K, V> StreamMap<'a, K, V>
where
    K: Hash + Eq + Clone + Send + 'a,
    V: Send + 'a,
{
    /// Returns `false` and drops `future` if `key` is already in progress.
    pub fn add_if_not_in_progress(&mut self, key: K, future: BoxFuture<'a, V>) -> bool {
        if !self.in_progress.insert(key.clone()) {
            return false;
        }
        self.futures.push(Box::pin(async move { (key, future.await) }));
        true
    }

    pub fn is_in_progress(&self, key: &K) -> bool {
        self.in_progress.contains(key)
    }

    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}

impl<K, V> Stream for StreamMap<'_, K, V>
where
    K: Hash + Eq + Unpin,
{
    type Item = (K, V);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.futures.poll_next_unpin(cx) {
            Poll::Ready(Some((key, value))) => {
                this.in_progress.remove(&key);
                Poll::Ready(Some((key, value)))
            }
            other => other,
        }
    }
}

impl<K, V> FusedStream for StreamMap<'_, K, V>
where
    K: Hash + Eq + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.futures.is_terminated()
    }
}
