/// Run a command against an in-memory aggregate: decide, then apply.
///
/// No persistence and no publication; the infra `CommandDispatcher` is the
/// production write path. Useful in unit tests and for previewing the effect
/// of a command on a rehydrated aggregate.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: quoteflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
