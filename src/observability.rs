use biometrics::{Collector, Counter, Moments};

pub(crate) static MODEL_REQUESTS: Counter = Counter::new("motorhead_chat.model.requests");
pub(crate) static MODEL_REQUEST_ERRORS: Counter =
    Counter::new("motorhead_chat.model.request_errors");
pub(crate) static MODEL_REQUEST_DURATION: Moments =
    Moments::new("motorhead_chat.model.request_duration_seconds");

pub(crate) static STREAM_TOKENS: Counter = Counter::new("motorhead_chat.stream.tokens");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("motorhead_chat.stream.errors");
pub(crate) static STREAM_TTFB: Moments = Moments::new("motorhead_chat.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments =
    Moments::new("motorhead_chat.stream.duration_seconds");

pub(crate) static MEMORY_REQUESTS: Counter = Counter::new("motorhead_chat.memory.requests");
pub(crate) static MEMORY_REQUEST_ERRORS: Counter =
    Counter::new("motorhead_chat.memory.request_errors");

pub(crate) static CHAIN_TURNS: Counter = Counter::new("motorhead_chat.chain.turns");
pub(crate) static CHAIN_TURN_ERRORS: Counter = Counter::new("motorhead_chat.chain.turn_errors");
pub(crate) static CHAIN_TURN_DURATION: Moments =
    Moments::new("motorhead_chat.chain.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&MODEL_REQUESTS);
    collector.register_counter(&MODEL_REQUEST_ERRORS);
    collector.register_moments(&MODEL_REQUEST_DURATION);

    collector.register_counter(&STREAM_TOKENS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&MEMORY_REQUESTS);
    collector.register_counter(&MEMORY_REQUEST_ERRORS);

    collector.register_counter(&CHAIN_TURNS);
    collector.register_counter(&CHAIN_TURN_ERRORS);
    collector.register_moments(&CHAIN_TURN_DURATION);
}
