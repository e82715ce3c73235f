use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use tcp_cc_abstract::{Seq, ServerConfig};

/// Decides, per arriving packet, whether the receiver pretends it was lost.
pub trait LossModel: fmt::Debug + Send {
    fn should_drop(&mut self, seq: Seq) -> bool;
}

/// Drops each packet independently with probability `rate`.
#[derive(Debug)]
pub struct RandomLoss {
    rate: f64,
    rng: StdRng,
}

impl RandomLoss {
    pub fn seeded(rate: f64, seed: u64) -> Self {
        Self {
            rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy(rate: f64) -> Self {
        Self {
            rate,
            rng: StdRng::from_os_rng(),
        }
    }
}

impl LossModel for RandomLoss {
    fn should_drop(&mut self, _seq: Seq) -> bool {
        self.rng.random::<f64>() < self.rate
    }
}

/// Drops the first arrival of each listed sequence number, nothing else.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLoss {
    pending: Vec<Seq>,
}

impl ScriptedLoss {
    pub fn new(sequences: impl IntoIterator<Item = Seq>) -> Self {
        Self {
            pending: sequences.into_iter().collect(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}

impl LossModel for ScriptedLoss {
    fn should_drop(&mut self, seq: Seq) -> bool {
        match self.pending.iter().position(|s| *s == seq) {
            Some(pos) => {
                self.pending.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Scripted drops first, then the random draw.
#[derive(Debug)]
pub struct CompositeLoss {
    scripted: ScriptedLoss,
    random: RandomLoss,
}

impl CompositeLoss {
    pub fn new(scripted: ScriptedLoss, random: RandomLoss) -> Self {
        Self { scripted, random }
    }
}

impl LossModel for CompositeLoss {
    fn should_drop(&mut self, seq: Seq) -> bool {
        let random = self.random.should_drop(seq);
        self.scripted.should_drop(seq) || random
    }
}

/// Loss model for the `index`-th connection accepted by a server.
pub fn loss_model_for(config: &ServerConfig, index: u64) -> Box<dyn LossModel> {
    let random = match config.seed {
        Some(seed) => RandomLoss::seeded(config.loss_rate, seed.wrapping_add(index)),
        None => RandomLoss::from_entropy(config.loss_rate),
    };
    if config.drop_sequences.is_empty() {
        Box::new(random)
    } else {
        Box::new(CompositeLoss::new(
            ScriptedLoss::new(config.drop_sequences.iter().copied()),
            random,
        ))
    }
}
