//! Background patch production: sampling, network inference and queueing run on a
//! worker thread while the caller reconstructs.

use std::thread::{self, JoinHandle};

use ndarray::{Array4, Axis};
use volstitch_core::{
    BatchReceiver, BatchSender, CancelToken, PatchBatch, PatchProducer, ProducerError, Pulled,
    SpatialInfo, panic_message, patch_queue,
};

use crate::network::PatchNetwork;
use crate::sampler::GridSampler;
use crate::subject::MemoryRegistry;

pub struct ThreadedProducer {
    receiver: BatchReceiver,
    worker: Option<JoinHandle<Result<(), ProducerError>>>,
}

impl ThreadedProducer {
    /// Spawns the worker. Subjects are emitted in registry order, each as one
    /// contiguous run, and the last batch is padded with stop records.
    pub fn run_threads<N>(
        registry: MemoryRegistry,
        sampler: GridSampler,
        network: N,
        batch_size: usize,
        queue_length: usize,
    ) -> Self
    where
        N: PatchNetwork + Send + 'static,
    {
        let batch_size = batch_size.max(1);
        let (sender, receiver) = patch_queue(queue_length.max(batch_size), batch_size);
        let worker = thread::spawn(move || {
            PatchWorker {
                sampler,
                network,
                sender,
                batch_size,
                images: Vec::with_capacity(batch_size),
                info: Vec::with_capacity(batch_size),
            }
            .run(&registry)
        });
        Self {
            receiver,
            worker: Some(worker),
        }
    }

    fn join_worker(&mut self) -> Result<(), ProducerError> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .unwrap_or_else(|e| Err(ProducerError::ThreadPanicked(panic_message(&*e)))),
            None => Ok(()),
        }
    }
}

impl PatchProducer for ThreadedProducer {
    fn pop_batch(&mut self, cancel: &CancelToken) -> Result<Pulled, ProducerError> {
        match self.receiver.pop(cancel) {
            Pulled::EndOfStream => {
                self.join_worker()?;
                Ok(Pulled::EndOfStream)
            }
            pulled => Ok(pulled),
        }
    }

    fn should_stop(&self) -> bool {
        self.receiver.is_closed()
    }

    fn close_all(&mut self) {
        self.receiver.close();
        if let Err(e) = self.join_worker() {
            log::warn!("Patch producer ended with an error: {e}");
        }
    }
}

impl Drop for ThreadedProducer {
    fn drop(&mut self) {
        self.close_all();
    }
}

enum Flow {
    Continue,
    Closed,
}

struct PatchWorker<N> {
    sampler: GridSampler,
    network: N,
    sender: BatchSender,
    batch_size: usize,
    images: Vec<Array4<f32>>,
    info: Vec<SpatialInfo>,
}

impl<N: PatchNetwork> PatchWorker<N> {
    fn run(mut self, registry: &MemoryRegistry) -> Result<(), ProducerError> {
        for subject in registry.subjects() {
            let locations = self
                .sampler
                .locations(subject.id(), subject.spatial_shape())?;
            log::debug!(
                "Sampling {} patches from subject {}",
                locations.len(),
                subject.id()
            );
            for location in locations {
                self.images
                    .push(self.sampler.extract(subject.image().view(), location.corner));
                self.info.push(location.info);
                if self.images.len() == self.batch_size {
                    if let Flow::Closed = self.send()? {
                        return Ok(());
                    }
                }
            }
        }

        let modalities = registry.subjects().next().map_or(1, |s| s.modalities());
        let stop = SpatialInfo::stop(self.sampler.rank());
        loop {
            self.images
                .push(Array4::zeros(self.sampler.patch_shape(modalities)));
            self.info.push(stop.clone());
            if self.images.len() == self.batch_size {
                break;
            }
        }
        self.send()?;
        Ok(())
    }

    fn send(&mut self) -> Result<Flow, ProducerError> {
        let views: Vec<_> = self.images.iter().map(|image| image.view()).collect();
        let images = ndarray::stack(Axis(0), &views)
            .map_err(|e| ProducerError::SamplingFailed(e.to_string()))?;
        self.images.clear();
        let info = std::mem::take(&mut self.info);

        let predictions = self
            .network
            .infer(images)
            .map_err(ProducerError::NetworkFailed)?;
        let batch = PatchBatch::new(predictions.into_dyn(), info)?;

        match self.sender.push(batch) {
            Ok(()) => Ok(Flow::Continue),
            Err(e) => {
                log::debug!("{e}, stopping patch production");
                Ok(Flow::Closed)
            }
        }
    }
}
