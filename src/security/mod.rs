pub mod certificates;

pub use certificates::FileCertificateProvider;
