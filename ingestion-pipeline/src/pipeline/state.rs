use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Prepared, Extracted, Answered, Persisted, Failed],
    events {
        prepare { transition: { from: Ready, to: Prepared } }
        extract { transition: { from: Prepared, to: Extracted } }
        answer { transition: { from: Extracted, to: Answered } }
        persist { transition: { from: Answered, to: Persisted } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Prepared, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Answered, to: Failed }
            transition: { from: Persisted, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
