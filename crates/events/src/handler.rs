/// Execute an aggregate command deterministically (no IO, no async).
///
/// Canonical decide-then-evolve lifecycle:
///
/// 1. **Decide**: calls `aggregate.handle(command)` to get events (pure, no mutation)
/// 2. **Evolve**: applies each event to the aggregate via `aggregate.apply(event)`
///
/// On error the aggregate is untouched. Callers persist the mutated aggregate
/// and act on the returned events inside their own unit of work.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: lumberyard_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
