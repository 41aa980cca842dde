use std::sync::Arc;

use async_trait::async_trait;
use manifold::{source, ActiveMerger, Consumer, MergeOptions, Multiplexer, Producer, Result};

/// A single-source stage that scales every value it pulls.
pub struct Scale<P> {
    upstream: P,
    factor: i64,
}

#[async_trait]
impl<P> Producer<i64> for Scale<P>
where
    P: Producer<i64>,
{
    async fn get(&self) -> Result<Option<i64>> {
        Ok(self.upstream.get().await?.map(|x| x * self.factor))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let tee: Multiplexer<i64> = Multiplexer::new(2, 3);
    tee.set_source(Arc::new(source::from_iter(4, 1..=10)))
        .unwrap();

    // one forwarding task per branch, since a scaled branch has no buffer of its own
    let merger: ActiveMerger<i64> = MergeOptions::default().capacity(4).active();
    for (branch, factor) in [1, 10, 100].into_iter().enumerate() {
        let upstream = tee.out(branch).unwrap();
        merger
            .set_source(Arc::new(Scale { upstream, factor }))
            .unwrap();
    }

    let mut total = 0;
    while let Some(value) = merger.get().await.unwrap() {
        println!("{value}");
        total += value;
    }

    println!("total {total}");
}
