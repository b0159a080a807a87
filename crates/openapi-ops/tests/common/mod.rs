#![allow(dead_code)]

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use unrelated_openapi_ops::{ApiServerConfig, OpenApiToolSource};

pub const ECHO_SPEC: &str = r##"
openapi: "3.0.3"
info:
  title: Echo API
  version: "1.0"
servers:
  - url: https://api.example.com
paths:
  /users/{id}:
    get:
      operationId: getUserById
      summary: Get a user
      tags: [users]
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: integer
        - name: verbose
          in: query
          schema:
            type: boolean
        - name: tags
          in: query
          schema:
            type: array
            items:
              type: string
        - name: X-Trace
          in: header
          schema:
            type: string
        - name: session
          in: cookie
          schema:
            type: string
      responses:
        "200":
          description: The user
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/User"
  /users:
    post:
      operationId: createUser
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/User"
          application/xml:
            schema:
              $ref: "#/components/schemas/User"
      responses:
        "201":
          description: Created
  /login:
    post:
      operationId: login
      requestBody:
        content:
          application/x-www-form-urlencoded:
            schema:
              type: object
              properties:
                username:
                  type: string
                password:
                  type: string
      responses:
        "200":
          description: ok
  /upload:
    post:
      operationId: uploadFile
      requestBody:
        required: true
        content:
          multipart/form-data:
            schema:
              type: object
              required: [file]
              properties:
                file:
                  $ref: "#/components/schemas/Binary"
                attachments:
                  type: array
                  items:
                    type: string
                    format: binary
                name:
                  type: string
      responses:
        "200":
          description: ok
  /status/{code}:
    get:
      operationId: getStatus
      parameters:
        - name: code
          in: path
          required: true
          schema:
            type: integer
      responses:
        "200":
          description: ok
  /text:
    get:
      operationId: getText
      responses:
        "200":
          description: ok
  /binary:
    get:
      operationId: getBinary
      responses:
        "200":
          description: ok
components:
  schemas:
    Binary:
      type: string
      format: binary
      description: The photo
    User:
      type: object
      required: [name]
      properties:
        name:
          type: string
        role:
          type: string
          enum: [admin, member]
        manager:
          $ref: "#/components/schemas/User"
"##;

pub fn write_spec(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join("echo.yaml");
    std::fs::write(&path, ECHO_SPEC).context("write spec")?;
    Ok(path)
}

/// Build a source from the echo document with its base URL pointed at `base_url`.
pub async fn echo_source(dir: &Path, base_url: &str) -> anyhow::Result<OpenApiToolSource> {
    let spec = write_spec(dir)?;
    let config = ApiServerConfig::new(spec.display().to_string()).with_base_url(base_url);
    OpenApiToolSource::build("echo", config)
        .await
        .context("build echo source")
}
