/// BALANCE CONSERVATION PROPERTY TESTS
///
/// Random juror and court operation sequences must never create or destroy stake:
/// - Wallet, staked balance and stake taken by the court add up to each juror's funding
/// - The custody vault holds the registry's total stake plus everything taken
/// - Rejected operations and refused collects leave every balance untouched
/// - Locked stake never exceeds the juror's active stake

use bleep_jurors::*;
use proptest::prelude::*;

const JURORS: [&str; 3] = ["alice", "bob", "carol"];
const FUNDING: u64 = 10_000;

#[derive(Debug, Clone)]
enum Op {
    Stake(usize, u64),
    Unstake(usize, u64),
    Activate(usize, u64),
    Deactivate(usize, u64),
    Lock(usize, u64),
    Unlock(usize, u64),
    Draft(u64, u64),
    Settle(usize, bool),
    Collect(usize, u64),
    NextTerm,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..JURORS.len(), 0u64..3_000).prop_map(|(j, a)| Op::Stake(j, a)),
        (0..JURORS.len(), 0u64..3_000).prop_map(|(j, a)| Op::Unstake(j, a)),
        (0..JURORS.len(), 0u64..3_000).prop_map(|(j, a)| Op::Activate(j, a)),
        (0..JURORS.len(), 0u64..3_000).prop_map(|(j, a)| Op::Deactivate(j, a)),
        (0..JURORS.len(), 1u64..500).prop_map(|(j, a)| Op::Lock(j, a)),
        (0..JURORS.len(), 0u64..500).prop_map(|(j, a)| Op::Unlock(j, a)),
        (1u64..5, 1u64..400).prop_map(|(d, l)| Op::Draft(d, l)),
        (0..JURORS.len(), any::<bool>()).prop_map(|(j, r)| Op::Settle(j, r)),
        (0..JURORS.len(), 1u64..2_000).prop_map(|(j, a)| Op::Collect(j, a)),
        Just(Op::NextTerm),
    ]
}

type Registry = JurorsRegistry<ManualClock, InMemoryCustody>;

fn address(j: usize) -> JurorAddress {
    JurorAddress::from(JURORS[j])
}

fn snapshot(reg: &Registry) -> (Vec<Balances>, U256, U256) {
    let balances = JURORS.iter().map(|name| reg.balance_of(&JurorAddress::from(*name))).collect();
    (balances, reg.total_active_balance(), reg.custody().vault())
}

/// Draft the term that just ended, or fail on term 0 where none has ended.
fn draft_last_term(reg: &mut Registry, court: &Caller, draws: u64, lock: u64) -> Result<(), RegistryError> {
    let current = reg.clock().current_term_id();
    let term = current.saturating_sub(1);
    let randomness = reg.clock().term_randomness(term).unwrap_or([0u8; 32]);
    let params = DraftParams::single_batch(randomness, term, draws, U256::from(lock));
    reg.draft(court, &params).map(|_| ())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stake_is_conserved_under_random_operations(
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let config = RegistryConfig { min_active_balance: U256::from(100u64), ..RegistryConfig::default() };
        let mut custody = InMemoryCustody::new();
        for name in JURORS {
            custody.fund(&JurorAddress::from(name), U256::from(FUNDING)).unwrap();
        }
        let mut reg = JurorsRegistry::new(config, ManualClock::new(0), custody).unwrap();
        let court = Caller::court("court");
        let mut taken = [U256::zero(); 3];

        for op in ops {
            let before = snapshot(&reg);
            let result = match op {
                Op::Stake(j, a) => reg.stake(&Caller::juror(JURORS[j]), U256::from(a)).map(|_| true),
                Op::Unstake(j, a) => reg.unstake(&Caller::juror(JURORS[j]), U256::from(a)).map(|_| true),
                Op::Activate(j, a) => reg.activate(&Caller::juror(JURORS[j]), U256::from(a)).map(|_| true),
                Op::Deactivate(j, a) => reg.deactivate(&Caller::juror(JURORS[j]), U256::from(a)).map(|_| true),
                Op::Lock(j, a) => reg.lock(&court, &address(j), U256::from(a)).map(|_| true),
                Op::Unlock(j, a) => reg.unlock(&court, &address(j), U256::from(a)).map(|_| true),
                Op::Draft(draws, lock) => draft_last_term(&mut reg, &court, draws, lock).map(|_| true),
                Op::Settle(j, rewarded) => {
                    let locked = reg.balance_of(&address(j)).locked;
                    reg.slash_or_unlock(&court, &[address(j)], &[locked], &[rewarded]).map(|slashed| {
                        taken[j] += slashed;
                        true
                    })
                }
                Op::Collect(j, a) => {
                    let collected = reg.collect(&court, &address(j), U256::from(a));
                    if let Ok(true) = collected {
                        taken[j] += U256::from(a);
                    }
                    collected
                }
                Op::NextTerm => {
                    reg.clock_mut().advance(1);
                    Ok(true)
                }
            };
            if !matches!(result, Ok(true)) {
                prop_assert_eq!(snapshot(&reg), before);
            }

            for (j, name) in JURORS.iter().enumerate() {
                let juror = JurorAddress::from(*name);
                let balances = reg.balance_of(&juror);
                prop_assert_eq!(balances.total(), reg.total_staked_for(&juror));
                prop_assert_eq!(
                    reg.custody().balance_of(&juror) + reg.total_staked_for(&juror) + taken[j],
                    U256::from(FUNDING)
                );
                prop_assert!(reg.active_balance_at(&juror, u64::MAX) >= balances.locked);
            }
            let taken_total = taken.iter().fold(U256::zero(), |acc, t| acc + *t);
            prop_assert_eq!(reg.custody().vault(), reg.total_staked() + taken_total);
            let active: U256 = JURORS
                .iter()
                .map(|name| {
                    let b = reg.balance_of(&JurorAddress::from(*name));
                    b.active + b.locked
                })
                .fold(U256::zero(), |acc, x| acc + x);
            prop_assert_eq!(reg.total_active_balance(), active);
        }
    }
}
