mod lifecycle;
mod queue_processor;
