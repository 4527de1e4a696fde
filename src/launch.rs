use std::thread;

use core_affinity::get_core_ids;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::message::channel::ChannelCommunicator;

/// Run an SPMD group of `size` partitions inside this process: one named
/// thread per rank, each handed its own member of a channel communicator
/// group. The threads run concurrently (never queued on a pool) because
/// partitions block on one another during halo exchange. With `pin_cores`,
/// rank `n` is pinned to core `n` modulo the number of cores. Results come
/// back in rank order.
///
pub fn launch<F, T>(size: usize, pin_cores: bool, f: F) -> Result<Vec<T>>
where
    F: Fn(ChannelCommunicator) -> T + Sync,
    T: Send,
{
    let cores = if pin_cores {
        get_core_ids().unwrap_or_default()
    } else {
        Vec::new()
    };
    if pin_cores && cores.is_empty() {
        warn!("No core ids available, partitions will not be pinned");
    }
    let f = &f;
    let cores = &cores;

    thread::scope(|scope| {
        let handles = ChannelCommunicator::group(size)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                thread::Builder::new()
                    .name(format!("partition-{}", rank))
                    .spawn_scoped(scope, move || {
                        if !cores.is_empty() {
                            let core = cores[rank % cores.len()];
                            debug!("Pinning partition {} to core {:?}", rank, core);
                            core_affinity::set_for_current(core);
                        }
                        f(comm)
                    })
                    .map_err(Error::from)
            })
            .collect::<Result<Vec<_>>>()?;

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| handle.join().map_err(|_| Error::PartitionPanicked(rank)))
            .collect()
    })
}
