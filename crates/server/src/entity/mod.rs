pub mod device_authorization;
