// Generated proto modules will be included here after build
// Run `cargo build` to generate the proto code

pub mod common {
    include!("trackback.common.rs");
}

pub mod items {
    include!("trackback.items.rs");
}

pub mod health {
    include!("grpc.health.v1.rs");
}
