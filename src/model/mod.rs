pub mod block;
pub mod conv;
pub mod resnet;
