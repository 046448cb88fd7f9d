// SPDX-License-Identifier: Apache-2.0
//! Spendable output selection.

use rand::seq::{index::sample, SliceRandom};
use rand::{thread_rng, Rng};
use tx_builder::AccountKeys;

use crate::container::{ContainerId, SpendableOutput};
use crate::currency::Currency;

/// Unlocked outputs of one address, ready for selection.
#[derive(Clone)]
pub struct SourceOutputs {
    pub account: AccountKeys,
    pub container: ContainerId,
    pub outputs: Vec<SpendableOutput>,
}

/// One chosen real input and the keys of the address that owns it.
#[derive(Clone)]
pub struct OutputToSpend {
    pub output: SpendableOutput,
    pub account: AccountKeys,
}

/// Randomly pick unlocked outputs until `needed` is covered or the working
/// set runs dry. At most one dust input (`amount <= dust_threshold`) is ever
/// accepted; every sampled output leaves the working set whether accepted or
/// not. When the dust allowance survives the loop unused, one dust output
/// from the remaining set is swept in.
///
/// The accumulated total is returned as found; covering `needed` is the
/// caller's problem.
pub fn select_transfers(
    needed: u64,
    allow_dust: bool,
    dust_threshold: u64,
    mut sources: Vec<SourceOutputs>,
) -> (Vec<OutputToSpend>, u64) {
    sources.retain(|source| !source.outputs.is_empty());

    let mut rng = thread_rng();
    let mut dust = allow_dust;
    let mut selected = Vec::new();
    let mut found = 0u64;

    while found < needed && !sources.is_empty() {
        let source_index = rng.gen_range(0..sources.len());
        let outputs = &mut sources[source_index].outputs;
        let output_index = rng.gen_range(0..outputs.len());

        let output = outputs[output_index];
        if output.amount > dust_threshold || dust {
            if output.amount <= dust_threshold {
                dust = false;
            }
            found += output.amount;
            selected.push(OutputToSpend {
                output,
                account: sources[source_index].account.clone(),
            });
        }

        sources[source_index].outputs.remove(output_index);
        if sources[source_index].outputs.is_empty() {
            sources.remove(source_index);
        }
    }

    if !dust {
        return (selected, found);
    }

    for source in &sources {
        if let Some(output) = source
            .outputs
            .iter()
            .find(|output| output.amount <= dust_threshold)
        {
            found += output.amount;
            selected.push(OutputToSpend {
                output: *output,
                account: source.account.clone(),
            });
            break;
        }
    }

    (selected, found)
}

/// Bucket count covering every decimal order of a `u64` amount.
pub const FUSION_BUCKETS: usize = 20;

/// Pick fusion inputs: census all fusion-applicable outputs into decimal
/// buckets, choose a random bucket holding at least `min_inputs`, and return
/// up to `max_inputs` of it, sampled without replacement, sorted by amount.
pub fn pick_fusion_inputs(
    sources: &[SourceOutputs],
    threshold: u64,
    min_inputs: usize,
    max_inputs: usize,
    currency: &Currency,
    height: u32,
) -> Vec<OutputToSpend> {
    let mut fusion_ready: Vec<(u8, OutputToSpend)> = Vec::new();
    let mut bucket_sizes = [0usize; FUSION_BUCKETS];

    for source in sources {
        for output in &source.outputs {
            if let Some(power) = currency.fusion_input_power_of_ten(output.amount, threshold, height)
            {
                bucket_sizes[power as usize] += 1;
                fusion_ready.push((
                    power,
                    OutputToSpend {
                        output: *output,
                        account: source.account.clone(),
                    },
                ));
            }
        }
    }

    let mut rng = thread_rng();
    let mut bucket_numbers: Vec<usize> = (0..FUSION_BUCKETS).collect();
    bucket_numbers.shuffle(&mut rng);

    let Some(selected_bucket) = bucket_numbers
        .into_iter()
        .find(|bucket| bucket_sizes[*bucket] >= min_inputs)
    else {
        return Vec::new();
    };

    let mut bucket_outputs: Vec<OutputToSpend> = fusion_ready
        .into_iter()
        .filter(|(power, _)| *power as usize == selected_bucket)
        .map(|(_, output)| output)
        .collect();

    if bucket_outputs.len() > max_inputs {
        let picks = sample(&mut rng, bucket_outputs.len(), max_inputs).into_vec();
        let mut trimmed = Vec::with_capacity(max_inputs);
        for pick in picks {
            trimmed.push(bucket_outputs[pick].clone());
        }
        bucket_outputs = trimmed;
    }

    bucket_outputs.sort_by_key(|candidate| candidate.output.amount);
    bucket_outputs
}
