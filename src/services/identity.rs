use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::SdkError;
use aws_sdk_cognitoidentityprovider::operation::admin_add_user_to_group::AdminAddUserToGroupError;
use aws_sdk_cognitoidentityprovider::operation::confirm_forgot_password::ConfirmForgotPasswordError;
use aws_sdk_cognitoidentityprovider::operation::delete_user::DeleteUserError;
use aws_sdk_cognitoidentityprovider::operation::forgot_password::ForgotPasswordError;
use aws_sdk_cognitoidentityprovider::operation::get_user::GetUserError;
use aws_sdk_cognitoidentityprovider::operation::initiate_auth::{InitiateAuthError, InitiateAuthOutput};
use aws_sdk_cognitoidentityprovider::operation::sign_up::SignUpError;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client;

use crate::models::auth::{AuthTokens, SignUpOutcome, UserProfile};

/// Managed user directory.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError>;

    async fn forgot_password(&self, email: &str) -> Result<(), IdentityError>;

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    async fn profile(&self, access_token: &str) -> Result<UserProfile, IdentityError>;

    async fn delete_self(&self, access_token: &str) -> Result<(), IdentityError>;

    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), IdentityError>;
}

/// Cognito user pool with a public (secretless) app client.
pub struct CognitoIdentityProvider {
    client: Client,
    user_pool_id: String,
    client_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(client: Client, user_pool_id: &str, client_id: &str) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Build from the ambient AWS configuration (env, profile, instance role).
    pub async fn from_env(region: Option<&str>, user_pool_id: &str, client_id: &str) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), user_pool_id, client_id)
    }

    fn tokens_from(
        output: InitiateAuthOutput,
        refresh_fallback: Option<&str>,
    ) -> Result<AuthTokens, IdentityError> {
        let result = output
            .authentication_result()
            .ok_or_else(|| IdentityError::ChallengeRequired(format!("{:?}", output.challenge_name())))?;

        let access_token = result
            .access_token()
            .ok_or_else(|| IdentityError::Provider("no access token returned".to_string()))?;

        Ok(AuthTokens {
            access_token: access_token.to_string(),
            id_token: result.id_token().map(str::to_string),
            refresh_token: result
                .refresh_token()
                .or(refresh_fallback)
                .map(str::to_string),
            expires_in: result.expires_in(),
            token_type: result.token_type().unwrap_or("Bearer").to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, IdentityError> {
        let mut request = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .user_attributes(attribute("email", email)?);
        if let Some(name) = name {
            request = request.user_attributes(attribute("name", name)?);
        }

        let output = request.send().await.map_err(|e| match e.into_service_error() {
            SignUpError::UsernameExistsException(_) => IdentityError::UserExists,
            SignUpError::InvalidPasswordException(e) => {
                IdentityError::InvalidInput(e.message().unwrap_or("invalid password").to_string())
            }
            SignUpError::InvalidParameterException(e) => {
                IdentityError::InvalidInput(e.message().unwrap_or("invalid parameter").to_string())
            }
            other => IdentityError::Provider(other.to_string()),
        })?;

        Ok(SignUpOutcome {
            user_sub: output.user_sub().to_string(),
            confirmed: output.user_confirmed(),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, IdentityError> {
        let output = self
            .client
            .initiate_auth()
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(map_auth_error)?;

        Self::tokens_from(output, None)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError> {
        let output = self
            .client
            .initiate_auth()
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::RefreshTokenAuth)
            .auth_parameters("REFRESH_TOKEN", refresh_token)
            .send()
            .await
            .map_err(map_auth_error)?;

        Self::tokens_from(output, Some(refresh_token))
    }

    async fn forgot_password(&self, email: &str) -> Result<(), IdentityError> {
        self.client
            .forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                ForgotPasswordError::UserNotFoundException(_) => IdentityError::UserNotFound,
                ForgotPasswordError::LimitExceededException(_)
                | ForgotPasswordError::TooManyRequestsException(_) => IdentityError::RateLimited,
                other => IdentityError::Provider(other.to_string()),
            })?;
        Ok(())
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        self.client
            .confirm_forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .confirmation_code(code)
            .password(new_password)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                ConfirmForgotPasswordError::CodeMismatchException(_)
                | ConfirmForgotPasswordError::ExpiredCodeException(_) => {
                    IdentityError::InvalidInput("invalid or expired confirmation code".to_string())
                }
                ConfirmForgotPasswordError::InvalidPasswordException(e) => {
                    IdentityError::InvalidInput(e.message().unwrap_or("invalid password").to_string())
                }
                ConfirmForgotPasswordError::UserNotFoundException(_) => IdentityError::UserNotFound,
                other => IdentityError::Provider(other.to_string()),
            })?;
        Ok(())
    }

    async fn profile(&self, access_token: &str) -> Result<UserProfile, IdentityError> {
        let output = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetUserError::NotAuthorizedException(_) => IdentityError::InvalidCredentials,
                GetUserError::UserNotFoundException(_) => IdentityError::UserNotFound,
                other => IdentityError::Provider(other.to_string()),
            })?;

        let attr = |name: &str| {
            output
                .user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(str::to_string)
        };

        Ok(UserProfile {
            username: output.username().to_string(),
            email: attr("email"),
            name: attr("name"),
            email_verified: attr("email_verified").as_deref() == Some("true"),
        })
    }

    async fn delete_self(&self, access_token: &str) -> Result<(), IdentityError> {
        self.client
            .delete_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                DeleteUserError::NotAuthorizedException(_) => IdentityError::InvalidCredentials,
                DeleteUserError::UserNotFoundException(_) => IdentityError::UserNotFound,
                other => IdentityError::Provider(other.to_string()),
            })?;
        Ok(())
    }

    async fn add_to_group(&self, username: &str, group: &str) -> Result<(), IdentityError> {
        self.client
            .admin_add_user_to_group()
            .user_pool_id(&self.user_pool_id)
            .username(username)
            .group_name(group)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                AdminAddUserToGroupError::UserNotFoundException(_) => IdentityError::UserNotFound,
                other => IdentityError::Provider(other.to_string()),
            })?;
        Ok(())
    }
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, IdentityError> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| IdentityError::Provider(e.to_string()))
}

fn map_auth_error(err: SdkError<InitiateAuthError>) -> IdentityError {
    match err.into_service_error() {
        InitiateAuthError::NotAuthorizedException(_)
        | InitiateAuthError::UserNotFoundException(_) => IdentityError::InvalidCredentials,
        InitiateAuthError::UserNotConfirmedException(_) => IdentityError::NotConfirmed,
        InitiateAuthError::PasswordResetRequiredException(_) => {
            IdentityError::ChallengeRequired("password reset required".to_string())
        }
        InitiateAuthError::TooManyRequestsException(_) => IdentityError::RateLimited,
        other => IdentityError::Provider(other.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("An account with this email already exists")]
    UserExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("User is not confirmed")]
    NotConfirmed,

    #[error("Additional authentication step required: {0}")]
    ChallengeRequired(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Identity provider error: {0}")]
    Provider(String),
}
