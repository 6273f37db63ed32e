use state_machines::state_machine;

state_machine! {
    name: StreamMachine,
    state: StreamState,
    initial: Idle,
    states: [Idle, Streaming, Done, Failed],
    events {
        begin { transition: { from: Idle, to: Streaming } }
        finish { transition: { from: Streaming, to: Done } }
        fail {
            transition: { from: Idle, to: Failed }
            transition: { from: Streaming, to: Failed }
        }
    }
}

pub fn idle() -> StreamMachine<(), Idle> {
    StreamMachine::new(())
}
