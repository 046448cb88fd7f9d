// SPDX-License-Identifier: Apache-2.0
//! Ring assembly: blend each real input into the fake outputs sampled by the
//! node, keeping rings sorted by global output index.

use tx_builder::{GlobalOutput, InputKeyInfo, PreparedInput, RealOutput};

use crate::error::{Result, WalletError};
use crate::node::RandomAmountOuts;
use crate::selector::OutputToSpend;

/// Enforce the sampling contract: with a non-zero mixin every requested
/// amount must come back with at least `mixin` outputs.
pub fn check_enough_mixins(
    mixin_result: &[RandomAmountOuts],
    mixin: u16,
    requested_amounts: usize,
) -> Result<()> {
    if mixin == 0 {
        return Ok(());
    }
    if mixin_result.len() < requested_amounts {
        return Err(WalletError::MixinCountTooBig);
    }
    if mixin_result
        .iter()
        .any(|outs_for_amount| outs_for_amount.outs.len() < mixin as usize)
    {
        return Err(WalletError::MixinCountTooBig);
    }
    Ok(())
}

/// Build one ring per selected input. Fakes are sorted by global index, the
/// real output is spliced in preserving that order, and its position is
/// recorded for the signer.
pub fn prepare_inputs(
    selected: &[OutputToSpend],
    mixin_result: &[RandomAmountOuts],
    mixin: u16,
) -> Vec<PreparedInput> {
    let mut prepared = Vec::with_capacity(selected.len());

    for (input_index, input) in selected.iter().enumerate() {
        let mut ring: Vec<GlobalOutput> = Vec::with_capacity(mixin as usize + 1);

        if let Some(outs_for_amount) = mixin_result.get(input_index) {
            let mut fakes = outs_for_amount.outs.clone();
            fakes.sort_by_key(|entry| entry.global_index);

            for fake in fakes {
                // The node may have sampled our own output; skip it.
                if fake.global_index != input.output.global_index {
                    ring.push(GlobalOutput {
                        index: fake.global_index,
                        target_key: fake.output_key,
                    });
                    if ring.len() >= mixin as usize {
                        break;
                    }
                }
            }
        }

        let ring_position = ring
            .iter()
            .position(|member| member.index >= input.output.global_index)
            .unwrap_or(ring.len());
        ring.insert(
            ring_position,
            GlobalOutput {
                index: input.output.global_index,
                target_key: input.output.output_key,
            },
        );

        prepared.push(PreparedInput {
            key_info: InputKeyInfo {
                amount: input.output.amount,
                ring,
                real: RealOutput {
                    tx_public_key: input.output.tx_public_key,
                    ring_position,
                    index_in_tx: input.output.index_in_tx,
                },
            },
            account: input.account.clone(),
        });
    }

    prepared
}
