mod fakes;
mod pipeline;
mod warmup;
