use std::{
    future::Future,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

/// The result of the last of several runs, with their mean duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// Run `op` `iterations` times, stopping at the first error.
pub async fn repeat<T, E, F, Fut>(iterations: NonZeroUsize, mut op: F) -> Result<Timed<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut value = op().await?;
    let mut total = start.elapsed();

    for _ in 1..iterations.get() {
        let start = Instant::now();
        value = op().await?;
        total += start.elapsed();
    }

    Ok(Timed {
        value,
        elapsed: mean(total, iterations),
    })
}

/// Blocking counterpart of [`repeat`].
pub fn repeat_sync<T, E>(
    iterations: NonZeroUsize,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<Timed<T>, E> {
    let start = Instant::now();
    let mut value = op()?;
    let mut total = start.elapsed();

    for _ in 1..iterations.get() {
        let start = Instant::now();
        value = op()?;
        total += start.elapsed();
    }

    Ok(Timed {
        value,
        elapsed: mean(total, iterations),
    })
}

fn mean(total: Duration, iterations: NonZeroUsize) -> Duration {
    total.div_f64(iterations.get() as f64)
}

/// How many times longer `slow` took than `fast`. `None` when `fast` is too
/// short to measure.
pub fn ratio(slow: Duration, fast: Duration) -> Option<f64> {
    (!fast.is_zero()).then(|| slow.as_secs_f64() / fast.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_sync_runs_every_iteration() {
        let mut calls = 0;
        let timed = repeat_sync(NonZeroUsize::new(4).unwrap(), || {
            calls += 1;
            Ok::<_, ()>(calls)
        })
        .unwrap();
        assert_eq!(timed.value, 4);
        assert_eq!(calls, 4);
    }

    #[test]
    fn repeat_sync_stops_at_first_error() {
        let mut calls = 0;
        let err = repeat_sync(NonZeroUsize::new(5).unwrap(), || {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(calls) }
        })
        .unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(calls, 2);
    }

    #[test]
    fn ratio_of_durations() {
        assert_eq!(
            ratio(Duration::from_millis(30), Duration::from_millis(10)),
            Some(3.0)
        );
        assert_eq!(ratio(Duration::from_millis(30), Duration::ZERO), None);
    }
}
