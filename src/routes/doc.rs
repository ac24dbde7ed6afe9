use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        appointments::{
            AppointmentList, CreateAppointmentRequest, ReviewRequest, UpdateAppointmentRequest,
            UpdateStatusRequest,
        },
        auth::{
            EmailRequest, LoginRequest, LoginResponse, ResetPasswordRequest, SignupRequest,
            VerifyOtpRequest,
        },
        services::{
            CreateServiceRequest, ServiceBookingList, ServiceList, ServiceWithProvider,
            UpdateServiceRequest,
        },
    },
    models::{
        Appointment, AppointmentStatus, Attachment, ProviderDetails, ProviderSummary, Role,
        Service, ServiceBooking, User,
    },
    response::{ApiResponse, Meta},
    routes::{appointments, auth, health, params, services},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::signup,
        auth::verify_otp,
        auth::resend_otp,
        auth::login,
        auth::logout,
        auth::forgot_password,
        auth::reset_password,
        services::create_service,
        services::search_services,
        services::list_provider_services,
        services::get_service,
        services::update_service,
        services::delete_service,
        services::list_service_bookings,
        appointments::create_appointment,
        appointments::list_appointments,
        appointments::get_appointment,
        appointments::update_appointment,
        appointments::update_status,
        appointments::review_appointment,
        appointments::delete_appointment
    ),
    components(
        schemas(
            User,
            Role,
            ProviderDetails,
            ProviderSummary,
            Service,
            ServiceBooking,
            Appointment,
            AppointmentStatus,
            Attachment,
            SignupRequest,
            LoginRequest,
            LoginResponse,
            VerifyOtpRequest,
            EmailRequest,
            ResetPasswordRequest,
            CreateServiceRequest,
            UpdateServiceRequest,
            ServiceWithProvider,
            ServiceList,
            ServiceBookingList,
            CreateAppointmentRequest,
            UpdateAppointmentRequest,
            UpdateStatusRequest,
            ReviewRequest,
            AppointmentList,
            params::Pagination,
            params::SortOrder,
            params::AppointmentListQuery,
            params::ProviderServicesQuery,
            params::ServiceSearchQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<LoginResponse>,
            ApiResponse<Service>,
            ApiResponse<ServiceWithProvider>,
            ApiResponse<ServiceList>,
            ApiResponse<ServiceBookingList>,
            ApiResponse<Appointment>,
            ApiResponse<AppointmentList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Signup, verification, sessions and password reset"),
        (name = "Services", description = "Service catalog and search"),
        (name = "Appointments", description = "Booking lifecycle"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
